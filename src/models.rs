use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY_COLOR: &str = "#007bff";
pub const DEFAULT_FIND_LIMIT: u32 = 50;
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub color: String, // display token, e.g. '#007bff'
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub category_id: Option<i64>,
    /// Joined from `categories`; `None` when the email is uncategorized.
    pub category_name: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_important: bool,
    pub is_archived: bool,
}

/// Input for [`crate::db::ArchiveStore::add_email`]. The send timestamp is
/// not part of it: the store assigns it at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub category_id: Option<i64>,
}

impl NewEmail {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: String::new(),
            category_id: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub color: String,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// Criteria for [`crate::db::ArchiveStore::find_emails`].
///
/// Every `None` field is left out of the query entirely; it never turns
/// into a "matches empty" constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailFilter {
    pub recipient: Option<String>,
    pub category_id: Option<i64>,
    pub is_read: Option<bool>,
    pub is_important: Option<bool>,
    pub limit: u32,
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self {
            recipient: None,
            category_id: None,
            is_read: None,
            is_important: None,
            limit: DEFAULT_FIND_LIMIT,
        }
    }
}

impl EmailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn read(mut self, is_read: bool) -> Self {
        self.is_read = Some(is_read);
        self
    }

    pub fn important(mut self, is_important: bool) -> Self {
        self.is_important = Some(is_important);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

/// One consistent snapshot of archive counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_emails: i64,
    pub unread: i64,
    pub important: i64,
    /// Every category, including empty ones, ordered by count descending.
    pub per_category: Vec<CategoryCount>,
}

impl Statistics {
    pub fn read_count(&self) -> i64 {
        self.total_emails - self.unread
    }

    /// Count for the first category with this name.
    pub fn count_for(&self, name: &str) -> Option<i64> {
        self.per_category
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.count)
    }

    pub fn categorized_total(&self) -> i64 {
        self.per_category.iter().map(|c| c.count).sum()
    }
}
