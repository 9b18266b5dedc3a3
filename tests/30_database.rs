//! Behaviour that depends on constraints and transactions in Postgres.
//! Each test skips itself when `DATABASE_URL` is unset.

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use forum_api::permissions::PermissionStore;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

macro_rules! live_or_skip {
    () => {
        match common::spawn_live().await? {
            Some(live) => live,
            None => return Ok(()),
        }
    };
}

async fn create_post(live: &common::LiveServer, author: &common::Member, title: &str) -> Result<Uuid> {
    let category_id = live.category_id("general").await?;
    let res = live
        .request(Method::POST, "/api/posts", author)
        .json(&json!({ "category_id": category_id, "title": title, "body": "Something worth reading" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    Ok(body["data"]["id"].as_str().unwrap().parse()?)
}

#[tokio::test]
async fn usernames_and_emails_are_unique_ignoring_case() -> Result<()> {
    let live = live_or_skip!();
    let first = live.register("Casey").await?;

    let res = live
        .server
        .client
        .post(live.server.url("/api/auth/register"))
        .json(&json!({
            "username": first.username.to_uppercase(),
            "email": "someone-else@example.test",
            "password": "correct horse battery",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await?;
    assert_eq!(body["code"], "CONFLICT");

    let res = live
        .server
        .client
        .post(live.server.url("/api/auth/register"))
        .json(&json!({
            "username": common::unique("other"),
            "email": format!("{}@EXAMPLE.TEST", first.username.to_uppercase()),
            "password": "correct horse battery",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn one_open_report_per_reporter_and_target() -> Result<()> {
    let live = live_or_skip!();
    let reporter = live.register("reporter").await?;
    let target = live.register("target").await?;

    let report = json!({ "target_kind": "user", "target_id": target.id, "reason": "Spamming every thread" });
    let res = live.request(Method::POST, "/api/reports", &reporter).json(&report).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = live.request(Method::POST, "/api/reports", &reporter).json(&report).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn message_row_goes_once_both_sides_delete_it() -> Result<()> {
    let live = live_or_skip!();
    let sender = live.register("sender").await?;
    let recipient = live.register("recipient").await?;

    let res = live
        .request(Method::POST, "/api/messages", &sender)
        .json(&json!({ "to": recipient.username, "body": "Hello there" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    let id: Uuid = body["data"]["id"].as_str().unwrap().parse()?;
    let path = format!("/api/messages/{}", id);

    let rows = || sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE id = $1").bind(id);

    let res = live.request(Method::DELETE, &path, &sender).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(rows().fetch_one(live.state.pool()).await?, 1);

    let res = live.request(Method::DELETE, &path, &recipient).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(rows().fetch_one(live.state.pool()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn own_edits_close_after_the_window() -> Result<()> {
    let live = live_or_skip!();
    let author = live.register("author").await?;
    let post_id = create_post(&live, &author, "Draft title").await?;
    let path = format!("/api/posts/{}", post_id);

    let res = live.request(Method::PATCH, &path, &author).json(&json!({ "title": "Better title" })).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let window = forum_api::config::config().forum.edit_window_minutes;
    sqlx::query("UPDATE posts SET created_at = $2 WHERE id = $1")
        .bind(post_id)
        .bind(Utc::now() - Duration::minutes(window + 5))
        .execute(live.state.pool())
        .await?;

    let res = live.request(Method::PATCH, &path, &author).json(&json!({ "title": "Too late now" })).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Holders of the unrestricted permission are not bound by the window
    let moderator = live.register_as("editor", "moderator").await?;
    let res = live.request(Method::PATCH, &path, &moderator).json(&json!({ "title": "Fixed typo" })).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn banning_a_moderator_takes_an_administrator() -> Result<()> {
    let live = live_or_skip!();
    let moderator = live.register_as("mod", "moderator").await?;
    let colleague = live.register_as("colleague", "moderator").await?;
    let admin = live.register_as("admin", "admin").await?;
    let path = format!("/api/moderation/users/{}/ban", colleague.username);
    let ban = json!({ "reason": "Abusing tools", "duration_hours": 24 });

    let res = live.request(Method::POST, &path, &moderator).json(&ban).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = live.request(Method::POST, &path, &admin).json(&ban).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn liking_twice_counts_once() -> Result<()> {
    let live = live_or_skip!();
    let author = live.register("poster").await?;
    let fan = live.register("fan").await?;
    let post_id = create_post(&live, &author, "Likeable").await?;
    let path = format!("/api/posts/{}/like", post_id);

    for _ in 0..2 {
        let res = live.request(Method::POST, &path, &fan).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        assert_eq!(body["data"]["liked"], true);
        assert_eq!(body["data"]["like_count"], 1);
    }

    let likes = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
        .bind(post_id)
        .fetch_one(live.state.pool())
        .await?;
    assert_eq!(likes, 1);
    Ok(())
}

#[tokio::test]
async fn trophy_grants_are_idempotent() -> Result<()> {
    let live = live_or_skip!();
    let member = live.register("collector").await?;
    let trophies = live.state.trophies();

    let first = trophies.award_as(None, "prolific", &member.username).await?;
    assert!(first.newly_awarded);
    let again = trophies.award_as(None, "prolific", &member.username).await?;
    assert!(!again.newly_awarded);

    let held = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM user_trophies ut JOIN trophies t ON t.id = ut.trophy_id WHERE ut.user_id = $1 AND t.slug = 'prolific'",
    )
    .bind(member.id)
    .fetch_one(live.state.pool())
    .await?;
    assert_eq!(held, 1);
    Ok(())
}

#[tokio::test]
async fn deleted_category_frees_its_slug() -> Result<()> {
    let live = live_or_skip!();
    let admin = live.register_as("curator", "admin").await?;
    let slug = common::unique("cat").replace('_', "-");
    let category = json!({ "slug": slug, "name": "Short lived" });

    let res = live.request(Method::POST, "/api/categories", &admin).json(&category).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = live.request(Method::POST, "/api/categories", &admin).json(&category).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = live.request(Method::DELETE, &format!("/api/categories/{}", slug), &admin).send().await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = live.request(Method::POST, "/api/categories", &admin).json(&category).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn secondary_role_for_unknown_user_is_not_found() -> Result<()> {
    let live = live_or_skip!();
    let err = PermissionStore::new(live.state.pool().clone())
        .add_secondary_role(Uuid::new_v4(), "moderator")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    Ok(())
}

#[tokio::test]
async fn user_listing_guards_private_columns_and_deleted_accounts() -> Result<()> {
    let live = live_or_skip!();
    let moderator = live.register_as("lister", "moderator").await?;
    let admin = live.register_as("overseer", "admin").await?;

    let by_hash = serde_json::to_string(&json!({ "password_hash": { "$like": "$2b$%" } }))?;
    let res = live
        .request(Method::GET, "/api/admin/users", &moderator)
        .query(&[("where", by_hash.as_str())])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = live
        .request(Method::GET, "/api/admin/users", &moderator)
        .query(&[("order", "password_hash asc")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = live
        .request(Method::GET, "/api/admin/users", &moderator)
        .query(&[("include_deleted", "true")])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let gone = live.register("departed").await?;
    sqlx::query("UPDATE users SET deleted_at = now() WHERE id = $1")
        .bind(gone.id)
        .execute(live.state.pool())
        .await?;
    let by_name = serde_json::to_string(&json!({ "username": gone.username }))?;
    for (include, expected) in [("false", 0), ("true", 1)] {
        let res = live
            .request(Method::GET, "/api/admin/users", &admin)
            .query(&[("where", by_name.as_str()), ("include_deleted", include)])
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        assert_eq!(body["data"]["total"], expected, "include_deleted={}", include);
        assert!(body["data"]["items"].as_array().unwrap().iter().all(|u| u.get("password_hash").is_none()));
    }
    Ok(())
}

#[tokio::test]
async fn post_search_filters_are_typed_by_column() -> Result<()> {
    let live = live_or_skip!();
    let author = live.register("typist").await?;
    let title = Uuid::new_v4().to_string();
    let post_id = create_post(&live, &author, &title).await?;

    // A uuid-shaped title is still compared as text, and a column list is ignored
    let res = live
        .server
        .client
        .post(live.server.url("/api/posts/find"))
        .json(&json!({ "select": ["title"], "where": { "title": title } }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], post_id.to_string());

    let res = live
        .server
        .client
        .post(live.server.url("/api/posts/find"))
        .json(&json!({ "where": { "author_id": author.id, "created_at": { "$gte": "2000-01-01" } } }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["total"], 1);

    let res = live
        .server
        .client
        .post(live.server.url("/api/posts/find"))
        .json(&json!({ "where": { "author_id": "not-a-uuid" } }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn blank_display_name_clears_it() -> Result<()> {
    let live = live_or_skip!();
    let member = live.register("renamer").await?;

    let res = live
        .request(Method::PATCH, "/api/auth/profile", &member)
        .json(&json!({ "display_name": "  Ren  " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["display_name"], "Ren");

    let res = live
        .request(Method::PATCH, "/api/auth/profile", &member)
        .json(&json!({ "display_name": "   ", "bio": "x".repeat(2001) }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert!(body["field_errors"]["bio"].is_string());

    let res = live
        .request(Method::PATCH, "/api/auth/profile", &member)
        .json(&json!({ "display_name": "   " }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert!(body["data"]["display_name"].is_null());
    Ok(())
}
