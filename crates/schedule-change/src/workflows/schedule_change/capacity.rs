use std::sync::Arc;

use serde::Serialize;

use super::domain::ResourceId;
use super::repository::{RepositoryError, ResourceDirectory};

/// Enrolled seats against classroom capacity for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub enrolled: u32,
    pub capacity: u32,
}

impl Occupancy {
    pub fn new(enrolled: u32, capacity: u32) -> Self {
        Self { enrolled, capacity }
    }

    pub fn has_available_seat(&self) -> bool {
        self.enrolled < self.capacity
    }

    pub fn available_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled)
    }

    /// Percentage of capacity in use. A zero-capacity room reports 100.
    pub fn percentage(&self) -> f32 {
        if self.capacity == 0 {
            return 100.0;
        }
        self.enrolled as f32 / self.capacity as f32 * 100.0
    }

    /// Whether the request at `position` (1-based) would fit in the seats left right now.
    pub fn arbitrate(&self, position: usize) -> SeatOutlook {
        let free = self.available_seats() as usize;
        if position >= 1 && position <= free {
            SeatOutlook::WithinCapacity
        } else {
            SeatOutlook::Waitlisted {
                ahead: position.saturating_sub(1),
                free_seats: free,
            }
        }
    }
}

/// Seat outlook for a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outlook", rename_all = "snake_case")]
pub enum SeatOutlook {
    WithinCapacity,
    Waitlisted { ahead: usize, free_seats: usize },
}

/// Reads occupancy from the resource directory on every call.
pub struct CapacityTracker<D> {
    directory: Arc<D>,
}

impl<D> Clone for CapacityTracker<D> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
        }
    }
}

impl<D> CapacityTracker<D>
where
    D: ResourceDirectory,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub fn occupancy(&self, resource_id: &ResourceId) -> Result<Occupancy, CapacityError> {
        let resource = self
            .directory
            .fetch_resource(resource_id)?
            .ok_or_else(|| CapacityError::UnknownResource(resource_id.clone()))?;
        let enrolled = self.directory.enrolled_count(resource_id)?;
        Ok(Occupancy::new(enrolled, resource.classroom.capacity))
    }

    pub fn has_available_seat(&self, resource_id: &ResourceId) -> Result<bool, CapacityError> {
        Ok(self.occupancy(resource_id)?.has_available_seat())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
