pub mod category;
pub mod comment;
pub mod message;
pub mod notification;
pub mod post;
pub mod report;
pub mod role;
pub mod trophy;
pub mod user;

pub use category::Category;
pub use comment::{Comment, CommentSummary};
pub use message::Message;
pub use notification::Notification;
pub use post::{Post, PostSummary};
pub use report::{ModerationAction, Report, ReportStatus, TargetKind};
pub use role::{PermissionRow, Role, RoleGrant};
pub use trophy::{AwardedTrophy, Trophy};
pub use user::{PublicProfile, User};
