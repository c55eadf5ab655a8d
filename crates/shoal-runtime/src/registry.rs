//! Entity registry
//!
//! Entities are keyed by a monotonically increasing [`EntityId`], so
//! iteration order is registration order.

use std::collections::BTreeMap;

use shoal_core::EntityId;

use crate::Entity;

/// Owns every live entity
#[derive(Debug)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        EntityRegistry {
            entities: BTreeMap::new(),
            next_id: EntityId::new(1),
        }
    }

    /// Allocate an id and insert the entity built for it
    pub fn register_with<F>(&mut self, build: F) -> EntityId
    where
        F: FnOnce(EntityId) -> Entity,
    {
        let id = self.next_id;
        self.next_id = id.next();
        self.entities.insert(id, build(id));
        id
    }

    pub fn unregister(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Entities currently Transforming or Displaying
    pub fn privilege_holders(&self) -> usize {
        self.iter().filter(|e| e.state().holds_privilege()).count()
    }
}
