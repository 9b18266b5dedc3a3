// Thin search: SQL narrows candidates with ILIKE, ranking happens here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use super::ServiceResult;
use crate::config;
use crate::database::models::{PostSummary, User};
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::FilterData;

const TITLE_WEIGHT: i64 = 3;
const BODY_WEIGHT: i64 = 1;
const PHRASE_BONUS: i64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    #[default]
    All,
    Posts,
    Comments,
    Users,
}

impl SearchKind {
    fn includes(self, other: SearchKind) -> bool {
        self == SearchKind::All || self == other
    }
}

impl FromStr for SearchKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SearchKind::All),
            "posts" | "post" => Ok(SearchKind::Posts),
            "comments" | "comment" => Ok(SearchKind::Comments),
            "users" | "user" => Ok(SearchKind::Users),
            other => Err(ApiError::invalid_field(
                "kind",
                format!("Unknown search kind '{}'; expected all, posts, comments or users", other),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub kind: SearchKind,
    pub id: Uuid,
    /// Post id for comments, the post itself for posts
    pub post_id: Option<Uuid>,
    pub title: String,
    pub snippet: String,
    pub author: Option<String>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub terms: Vec<String>,
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

/// Row of comment_summaries with the post context search needs
#[derive(Debug, FromRow, Serialize)]
struct CommentMatch {
    id: Uuid,
    post_id: Uuid,
    body: String,
    created_at: DateTime<Utc>,
    author_username: String,
    post_title: String,
}

/// Split a query into lowercase terms, dropping short ones and duplicates
pub fn parse_terms(query: &str, min_length: usize, max_terms: usize) -> Result<Vec<String>, ApiError> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split_whitespace() {
        let term = word.to_lowercase();
        if term.chars().count() >= min_length && !terms.contains(&term) {
            terms.push(term);
        }
        if terms.len() == max_terms {
            break;
        }
    }
    if terms.is_empty() {
        return Err(ApiError::invalid_field(
            "q",
            format!("Search needs at least one term of {} or more characters", min_length),
        ));
    }
    Ok(terms)
}

/// Escape LIKE wildcards so user text matches literally
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `{"$or": [{col: {"$ilike": "%term%"}}, ...]}` over every column and term
pub fn ilike_any(columns: &[&str], terms: &[String]) -> Value {
    let clauses: Vec<Value> = columns
        .iter()
        .flat_map(|col| {
            terms
                .iter()
                .map(move |term| json!({ *col: { "$ilike": format!("%{}%", escape_like(term)) } }))
        })
        .collect();
    json!({ "$or": clauses })
}

/// Title hits weigh 3 and body hits 1 per term; the whole phrase adds 5
pub fn score(terms: &[String], phrase: &str, title: &str, body: &str) -> i64 {
    let title = title.to_lowercase();
    let body = body.to_lowercase();
    let mut total = 0;
    for term in terms {
        if title.contains(term.as_str()) {
            total += TITLE_WEIGHT;
        }
        if body.contains(term.as_str()) {
            total += BODY_WEIGHT;
        }
    }
    if terms.len() > 1 && (title.contains(phrase) || body.contains(phrase)) {
        total += PHRASE_BONUS;
    }
    total
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Text around the first term found in `body`, `radius` characters each side
pub fn snippet(body: &str, terms: &[String], radius: usize) -> String {
    let chars: Vec<char> = body.chars().collect();
    let folded: Vec<char> = chars.iter().copied().map(fold).collect();

    let first = terms
        .iter()
        .filter_map(|term| {
            let needle: Vec<char> = term.chars().map(fold).collect();
            if needle.is_empty() || needle.len() > folded.len() {
                return None;
            }
            folded
                .windows(needle.len())
                .position(|w| w == needle.as_slice())
                .map(|at| (at, needle.len()))
        })
        .min();

    let Some((at, len)) = first else {
        let head: String = chars.iter().take(radius * 2).collect();
        return if chars.len() > radius * 2 { format!("{}...", head.trim_end()) } else { head };
    };

    let start = at.saturating_sub(radius);
    let end = (at + len + radius).min(chars.len());
    let mut out: String = chars[start..end].iter().collect();
    out = out.trim().to_string();
    if start > 0 {
        out.insert_str(0, "...");
    }
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

/// Highest score first, newest first among equals
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.created_at.cmp(&a.created_at)));
}

pub struct SearchService {
    pool: PgPool,
}

impl SearchService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn search(&self, query: SearchQuery) -> ServiceResult<SearchResults> {
        let settings = &config::config().search;
        let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
            Some(kind) => kind.parse()?,
            None => SearchKind::All,
        };
        let phrase = query.q.trim().to_lowercase();
        let terms = parse_terms(&phrase, settings.min_term_length, settings.max_terms)?;
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(settings.max_results)
            .min(settings.max_results);
        let category = query.category.as_deref().filter(|c| !c.is_empty());

        let mut hits = Vec::new();
        if kind.includes(SearchKind::Posts) {
            hits.extend(self.posts(&terms, &phrase, category, limit).await?);
        }
        if kind.includes(SearchKind::Comments) {
            hits.extend(self.comments(&terms, &phrase, category, limit).await?);
        }
        if kind.includes(SearchKind::Users) && category.is_none() {
            hits.extend(self.users(&terms, &phrase, limit).await?);
        }

        rank(&mut hits);
        hits.truncate(limit as usize);
        tracing::debug!("Search '{}' ({:?}) matched {} hits", phrase, kind, hits.len());

        Ok(SearchResults {
            query: query.q.trim().to_string(),
            total: hits.len(),
            terms,
            hits,
        })
    }

    fn candidates(where_clause: Value, limit: i64) -> FilterData {
        FilterData {
            where_clause: Some(where_clause),
            order: Some(json!("created_at desc")),
            limit: Some(limit as i32),
            ..Default::default()
        }
    }

    async fn posts(&self, terms: &[String], phrase: &str, category: Option<&str>, limit: i64) -> ServiceResult<Vec<SearchHit>> {
        let mut clause = ilike_any(&["title", "body"], terms);
        if let Some(category) = category {
            clause["category_slug"] = json!(category);
        }
        let rows = Repository::<PostSummary>::new("post_summaries", self.pool.clone())
            .select_any(Self::candidates(clause, limit))
            .await?;

        let radius = config::config().search.snippet_radius;
        Ok(rows
            .into_iter()
            .map(|post| SearchHit {
                kind: SearchKind::Posts,
                id: post.id,
                post_id: Some(post.id),
                score: score(terms, phrase, &post.title, &post.body),
                snippet: snippet(&post.body, terms, radius),
                title: post.title,
                author: Some(post.author_username),
                created_at: post.created_at,
            })
            .collect())
    }

    async fn comments(&self, terms: &[String], phrase: &str, category: Option<&str>, limit: i64) -> ServiceResult<Vec<SearchHit>> {
        let mut clause = ilike_any(&["body"], terms);
        clause["post_deleted_at"] = json!({ "$null": true });
        if let Some(category) = category {
            clause["category_slug"] = json!(category);
        }
        let rows = Repository::<CommentMatch>::new("comment_summaries", self.pool.clone())
            .select_any(Self::candidates(clause, limit))
            .await?;

        let radius = config::config().search.snippet_radius;
        Ok(rows
            .into_iter()
            .map(|comment| SearchHit {
                kind: SearchKind::Comments,
                id: comment.id,
                post_id: Some(comment.post_id),
                score: score(terms, phrase, "", &comment.body),
                snippet: snippet(&comment.body, terms, radius),
                title: comment.post_title,
                author: Some(comment.author_username),
                created_at: comment.created_at,
            })
            .collect())
    }

    async fn users(&self, terms: &[String], phrase: &str, limit: i64) -> ServiceResult<Vec<SearchHit>> {
        let clause = ilike_any(&["username", "display_name", "bio"], terms);
        let rows = Repository::<User>::new("users", self.pool.clone())
            .select_any(Self::candidates(clause, limit))
            .await?;

        let radius = config::config().search.snippet_radius;
        Ok(rows
            .into_iter()
            .map(|user| {
                let about = match &user.display_name {
                    Some(name) => format!("{} {}", name, user.bio),
                    None => user.bio.clone(),
                };
                SearchHit {
                    kind: SearchKind::Users,
                    id: user.id,
                    post_id: None,
                    score: score(terms, phrase, &user.username, &about),
                    snippet: snippet(&about, terms, radius),
                    title: user.username,
                    author: None,
                    created_at: user.created_at,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn parses_and_limits_terms() {
        assert_eq!(parse_terms("  Rust  is A great Rust lang ", 2, 8).unwrap(), terms(&["rust", "is", "great", "lang"]));
        assert_eq!(parse_terms("one two three four", 2, 2).unwrap(), terms(&["one", "two"]));
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = parse_terms("   a b  ", 2, 8).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(parse_terms("", 2, 8).is_err());
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn ilike_clause_covers_every_column_and_term() {
        let clause = ilike_any(&["title", "body"], &terms(&["a_b", "cd"]));
        let parts = clause["$or"].as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["title"]["$ilike"], "%a\\_b%");
        assert_eq!(parts[3]["body"]["$ilike"], "%cd%");
    }

    #[test]
    fn title_hits_outweigh_body_hits() {
        let t = terms(&["tokio"]);
        assert_eq!(score(&t, "tokio", "Tokio tips", "nothing here"), 3);
        assert_eq!(score(&t, "tokio", "Tips", "use tokio"), 1);
        assert_eq!(score(&t, "tokio", "Tokio", "tokio"), 4);
    }

    #[test]
    fn exact_phrase_earns_bonus() {
        let t = terms(&["async", "rust"]);
        let with_phrase = score(&t, "async rust", "Async Rust guide", "");
        let scattered = score(&t, "async rust", "Rust and async", "");
        assert_eq!(with_phrase, 3 + 3 + 5);
        assert_eq!(scattered, 6);
    }

    #[test]
    fn snippet_centres_on_first_match() {
        let body = "aaaaaaaaaa needle bbbbbbbbbb";
        assert_eq!(snippet(body, &terms(&["needle"]), 5), "...aaaa needle bbbb...");
        assert_eq!(snippet("short NEEDLE", &terms(&["needle"]), 50), "short NEEDLE");
    }

    #[test]
    fn snippet_without_match_is_head_of_body() {
        assert_eq!(snippet("abcdefghij", &terms(&["zz"]), 2), "abcd...");
        assert_eq!(snippet("abc", &terms(&["zz"]), 2), "abc");
    }

    #[test]
    fn snippet_handles_multibyte_text() {
        let s = snippet("héllo wörld ünïcode", &terms(&["wörld"]), 3);
        assert!(s.contains("wör"));
    }

    #[test]
    fn ranks_by_score_then_recency() {
        let now = Utc::now();
        let hit = |score, minutes| SearchHit {
            kind: SearchKind::Posts,
            id: Uuid::new_v4(),
            post_id: None,
            title: String::new(),
            snippet: String::new(),
            author: None,
            score,
            created_at: now - Duration::minutes(minutes),
        };
        let mut hits = vec![hit(1, 0), hit(5, 10), hit(5, 1)];
        rank(&mut hits);
        assert_eq!(hits.iter().map(|h| h.score).collect::<Vec<_>>(), vec![5, 5, 1]);
        assert!(hits[0].created_at > hits[1].created_at);
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("posts".parse::<SearchKind>().unwrap(), SearchKind::Posts);
        assert_eq!("user".parse::<SearchKind>().unwrap(), SearchKind::Users);
        assert!("threads".parse::<SearchKind>().is_err());
        assert!(SearchKind::All.includes(SearchKind::Comments));
        assert!(!SearchKind::Posts.includes(SearchKind::Users));
    }
}
