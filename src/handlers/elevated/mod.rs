// handlers/elevated/mod.rs - Elevated handlers
//
// Same middleware stack as the protected tier. The services check the
// moderation, trophy, category and admin permissions each route needs, so a
// member calling these gets 403 naming the missing permission.

pub mod admin;
pub mod categories;
pub mod moderation;
pub mod trophies;
