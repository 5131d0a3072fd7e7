//! Database schemas
//!
//! MongoDB document structures for identities, the address/residency ledger,
//! the street directory, chat, posts, direct messages and reports.

mod address;
mod address_resident;
mod conversation;
mod metadata;
mod post;
mod report;
mod street_chat_message;
mod street_group;
mod street_membership;
mod town;
mod user;

pub use address::{normalize_postcode, AddressDoc, NewAddress, ADDRESS_COLLECTION};
pub use address_resident::{
    AddressResidentDoc, ResidentRole, ResidentState, ADDRESS_RESIDENT_COLLECTION,
};
pub use conversation::{
    member_hash, ConversationDoc, MessageDoc, CONVERSATION_COLLECTION, MESSAGE_COLLECTION,
};
pub use metadata::Metadata;
pub use post::{
    CommentDoc, PostCategory, PostDoc, PostStatus, PostVisibility, COMMENT_COLLECTION,
    POST_COLLECTION,
};
pub use report::{ReportDoc, ReportStatus, ReportTarget, REPORT_COLLECTION};
pub use street_chat_message::{StreetChatMessageDoc, STREET_CHAT_COLLECTION};
pub use street_group::{StreetGroupDoc, STREET_GROUP_COLLECTION};
pub use street_membership::{StreetMembershipDoc, STREET_MEMBERSHIP_COLLECTION};
pub use town::{TownDoc, TOWN_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
