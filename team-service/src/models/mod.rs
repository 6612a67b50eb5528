pub mod audit_event;
pub mod invitation;
pub mod membership;
pub mod provider;
pub mod role;
pub mod user;

pub use audit_event::{AuditAction, AuditEvent, AuditEventResponse, RequestOrigin};
pub use invitation::{
    AcceptInvitationRequest, Invitation, InvitationPreviewResponse, InvitationResponse,
    InvitationState, IssueInvitationRequest,
};
pub use membership::{
    ChangeMemberRoleRequest, MemberRecord, Membership, MembershipResponse, MembershipStatus,
};
pub use provider::{
    Provider, ProviderResponse, ProvisionProviderRequest, ProvisionProviderResponse,
};
pub use role::{TeamRole, UnknownRoleError};
pub use user::{User, UserResponse};
