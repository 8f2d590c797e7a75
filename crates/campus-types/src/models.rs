use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted enum value is not one we know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Coordinator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Coordinator => "COORDINATOR",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Self::Student),
            "COORDINATOR" => Ok(Self::Coordinator),
            "ADMIN" => Ok(Self::Admin),
            other => Err(ParseEnumError { kind: "role", value: other.to_string() }),
        }
    }
}

/// The kind of listing a conversation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    LostItem,
    FoundItem,
    Book,
    Event,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LostItem => "LOST_ITEM",
            Self::FoundItem => "FOUND_ITEM",
            Self::Book => "BOOK",
            Self::Event => "EVENT",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOST_ITEM" => Ok(Self::LostItem),
            "FOUND_ITEM" => Ok(Self::FoundItem),
            "BOOK" => Ok(Self::Book),
            "EVENT" => Ok(Self::Event),
            other => Err(ParseEnumError { kind: "item type", value: other.to_string() }),
        }
    }
}

/// A reference to exactly one listing. Conversations point at these
/// polymorphically, so every lookup goes through this type instead of
/// matching on (type, id) pairs at each call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemRef {
    LostItem(String),
    FoundItem(String),
    Book(String),
    Event(String),
}

impl ItemRef {
    pub fn new(kind: ItemType, id: impl Into<String>) -> Self {
        let id = id.into();
        match kind {
            ItemType::LostItem => Self::LostItem(id),
            ItemType::FoundItem => Self::FoundItem(id),
            ItemType::Book => Self::Book(id),
            ItemType::Event => Self::Event(id),
        }
    }

    pub fn kind(&self) -> ItemType {
        match self {
            Self::LostItem(_) => ItemType::LostItem,
            Self::FoundItem(_) => ItemType::FoundItem,
            Self::Book(_) => ItemType::Book,
            Self::Event(_) => ItemType::Event,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::LostItem(id) | Self::FoundItem(id) | Self::Book(id) | Self::Event(id) => id,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

/// Public profile subset attached to messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Owner / poster of a listing as shown in admin views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
}

/// Item context for a conversation, one shape per listing kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemSummary {
    #[serde(rename_all = "camelCase")]
    LostItem {
        id: String,
        title: String,
        category: String,
        status: String,
        user: Option<OwnerSummary>,
    },
    #[serde(rename_all = "camelCase")]
    FoundItem {
        id: String,
        title: String,
        category: String,
        status: String,
        user: Option<OwnerSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Book {
        id: String,
        title: String,
        author: String,
        #[serde(rename = "type")]
        kind: String,
        available: bool,
        owner: Option<OwnerSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        id: String,
        title: String,
        date: DateTime<Utc>,
        venue: String,
        posted_by: Option<OwnerSummary>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ref_round_trips_kind_and_id() {
        let item = ItemRef::new(ItemType::Book, "b1");
        assert_eq!(item, ItemRef::Book("b1".into()));
        assert_eq!(item.kind(), ItemType::Book);
        assert_eq!(item.id(), "b1");
        assert_eq!(item.to_string(), "BOOK/b1");
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&ItemType::LostItem).unwrap(), "\"LOST_ITEM\"");
        assert_eq!(serde_json::to_string(&Role::Coordinator).unwrap(), "\"COORDINATOR\"");
        assert_eq!("FOUND_ITEM".parse::<ItemType>().unwrap(), ItemType::FoundItem);
        assert!("PARCEL".parse::<ItemType>().is_err());
        assert!("student".parse::<Role>().is_err());
    }

    #[test]
    fn test_item_summary_is_tagged_by_item_type() {
        let summary = ItemSummary::Book {
            id: "b1".into(),
            title: "Linear Algebra".into(),
            author: "Strang".into(),
            kind: "SELL".into(),
            available: true,
            owner: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["itemType"], "BOOK");
        assert_eq!(json["type"], "SELL");
        assert_eq!(json["title"], "Linear Algebra");
    }
}
