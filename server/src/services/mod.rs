pub mod cards;
pub mod events;
pub mod inventory;
pub mod lifecycle;
pub mod permissions;
pub mod purchase;
pub mod report;
