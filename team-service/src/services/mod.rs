//! Services layer for team-service.
//!
//! Business logic for provisioning, invitations, membership management
//! and the audit trail, on top of the storage traits in `crate::db`.

pub mod audit;
pub mod authz;
pub mod clock;
pub mod email;
pub mod error;
pub mod rate_limit;
pub mod team;

pub use audit::{AuditQuery, AuditRecorder, AuditSink, MemoryAuditSink, PgAuditSink};
pub use authz::{Authorizer, AuthzGrant};
pub use clock::{Clock, ManualClock, SystemClock};
pub use email::{EmailNotifier, InvitationEmail, MockNotificationSender, NotificationSender};
pub use error::ServiceError;
pub use rate_limit::{INVITE_ACTION, InviteRateLimiter, RateDecision};
pub use team::TeamService;
