use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::inventory::{book_label, ONLINE_BOOK_NUMBER};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub event_id: Uuid,
    pub number: i32,
}

impl Book {
    pub fn label(&self) -> String {
        book_label(self.number)
    }

    pub fn is_online(&self) -> bool {
        self.number == ONLINE_BOOK_NUMBER
    }
}
