//! Sea-ORM entities for lostfound-store

pub mod conversations;
pub mod group_chats;
pub mod group_members;
pub mod messages;

pub use conversations::Entity as Conversations;
pub use group_chats::Entity as GroupChats;
pub use group_members::Entity as GroupMembers;
pub use messages::Entity as Messages;
