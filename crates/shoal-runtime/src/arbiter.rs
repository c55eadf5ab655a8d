//! Attraction arbitration
//!
//! Picks at most one entity per tick for the hands to pull on.

use shoal_core::{EntityId, Vec2};
use shoal_pose::HandState;

use crate::{AttractionConfig, EntityRegistry};

/// The arbitration winner for one tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub entity: EntityId,
    /// Midpoint of the two wrists
    pub centroid: Vec2,
    /// Entity distance to the centroid
    pub distance: f32,
}

/// What the arbiter needs to know about an entity
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub id: EntityId,
    pub position: Vec2,
    /// False while the entity holds the transformation privilege
    pub eligible: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct AttractionArbiter {
    pub hands_together_threshold: f32,
    pub attraction_radius: f32,
}

impl AttractionArbiter {
    pub fn new(config: &AttractionConfig) -> Self {
        AttractionArbiter {
            hands_together_threshold: config.hands_together_threshold,
            attraction_radius: config.attraction_radius,
        }
    }

    /// Centroid of the wrists when both are known and strictly closer than
    /// the threshold
    pub fn gesture_centroid(&self, hands: &HandState) -> Option<Vec2> {
        let distance = hands.wrist_distance()?;
        if distance < self.hands_together_threshold {
            hands.wrist_centroid()
        } else {
            None
        }
    }

    /// Nearest eligible candidate strictly inside the radius.
    ///
    /// Candidates must arrive in registration order: on equal distance the
    /// first one wins.
    pub fn select_from<I>(&self, hands: &HandState, candidates: I) -> Option<Selection>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let centroid = self.gesture_centroid(hands)?;
        let mut best: Option<Selection> = None;
        for candidate in candidates {
            if !candidate.eligible {
                continue;
            }
            let distance = candidate.position.distance(&centroid);
            if distance >= self.attraction_radius {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Selection {
                    entity: candidate.id,
                    centroid,
                    distance,
                });
            }
        }
        best
    }

    pub fn select(&self, hands: &HandState, registry: &EntityRegistry) -> Option<Selection> {
        self.select_from(
            hands,
            registry.iter().map(|e| Candidate {
                id: e.id(),
                position: e.position(),
                eligible: !e.state().holds_privilege(),
            }),
        )
    }
}
