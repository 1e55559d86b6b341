//! Restaurant menus, as replicated into the order service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DomainError;
use crate::order::Money;

/// Unique identifier for a restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(Uuid);

impl RestaurantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RestaurantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Menu item identifier, unique within a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuItemId(String);

impl MenuItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MenuItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MenuItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MenuItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub price: Money,
}

impl MenuItem {
    pub fn new(id: impl Into<MenuItemId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub menu_items: Vec<MenuItem>,
}

impl Restaurant {
    pub fn new(id: RestaurantId, name: impl Into<String>, menu_items: Vec<MenuItem>) -> Self {
        Self {
            id,
            name: name.into(),
            menu_items,
        }
    }

    pub fn find_menu_item(&self, menu_item_id: &MenuItemId) -> Option<&MenuItem> {
        self.menu_items.iter().find(|mi| &mi.id == menu_item_id)
    }
}

/// Lookup of restaurants and their menus.
#[async_trait]
pub trait RestaurantRepository: Send + Sync {
    async fn find_by_id(&self, id: RestaurantId) -> Result<Option<Restaurant>, DomainError>;

    /// Inserts or replaces a restaurant.
    async fn save(&self, restaurant: Restaurant) -> Result<(), DomainError>;
}

#[async_trait]
impl<T: RestaurantRepository + ?Sized> RestaurantRepository for Arc<T> {
    async fn find_by_id(&self, id: RestaurantId) -> Result<Option<Restaurant>, DomainError> {
        (**self).find_by_id(id).await
    }

    async fn save(&self, restaurant: Restaurant) -> Result<(), DomainError> {
        (**self).save(restaurant).await
    }
}

/// In-memory restaurant repository.
#[derive(Clone, Default)]
pub struct InMemoryRestaurantRepository {
    restaurants: Arc<RwLock<HashMap<RestaurantId, Restaurant>>>,
}

impl InMemoryRestaurantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RestaurantRepository for InMemoryRestaurantRepository {
    async fn find_by_id(&self, id: RestaurantId) -> Result<Option<Restaurant>, DomainError> {
        Ok(self.restaurants.read().await.get(&id).cloned())
    }

    async fn save(&self, restaurant: Restaurant) -> Result<(), DomainError> {
        self.restaurants
            .write()
            .await
            .insert(restaurant.id, restaurant);
        Ok(())
    }
}
