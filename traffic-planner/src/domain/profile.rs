//! Occupancy profiles.
//!
//! A [`Profile`] describes how much space a vehicle takes up and how strictly
//! that space must be treated as exclusive. Segments never own a profile by
//! value: they hold a [`ProfileHandle`], and every segment (in any trajectory,
//! including copies) that was given the same handle observes mutations made
//! through it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use super::Shape;

/// How strictly a footprint's occupied space is treated as exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "queue_id", rename_all = "snake_case")]
pub enum Agency {
    /// The space is exclusive against everyone.
    Strict,
    /// The vehicle negotiates space with other autonomous vehicles itself.
    Autonomous,
    /// The vehicle waits its turn in the named queue.
    Queued(String),
}

/// Footprint shape plus agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub shape: Shape,
    pub agency: Agency,
}

impl Profile {
    /// Creates a profile from its parts.
    pub fn new(shape: Shape, agency: Agency) -> Self {
        Self { shape, agency }
    }

    /// Returns the queue id if the agency is [`Agency::Queued`].
    pub fn queue_id(&self) -> Option<&str> {
        match &self.agency {
            Agency::Queued(id) => Some(id),
            _ => None,
        }
    }
}

/// Shared, mutable reference to a [`Profile`].
///
/// Cloning a handle shares the profile; it never copies it. Equality is
/// identity: two handles are equal when they refer to the same profile.
#[derive(Clone)]
pub struct ProfileHandle(Arc<RwLock<Profile>>);

impl ProfileHandle {
    /// Wraps a profile in a new handle.
    pub fn new(profile: Profile) -> Self {
        Self(Arc::new(RwLock::new(profile)))
    }

    /// Creates a strict profile.
    pub fn strict(shape: Shape) -> Self {
        Self::new(Profile::new(shape, Agency::Strict))
    }

    /// Creates an autonomous profile.
    pub fn autonomous(shape: Shape) -> Self {
        Self::new(Profile::new(shape, Agency::Autonomous))
    }

    /// Creates a queued profile.
    pub fn queued(shape: Shape, queue_id: impl Into<String>) -> Self {
        Self::new(Profile::new(shape, Agency::Queued(queue_id.into())))
    }

    /// A copy of the profile's current value.
    pub fn snapshot(&self) -> Profile {
        self.read().clone()
    }

    /// The current footprint.
    pub fn shape(&self) -> Shape {
        self.read().shape
    }

    /// The current agency.
    pub fn agency(&self) -> Agency {
        self.read().agency.clone()
    }

    /// The queue id, if the profile is currently queued.
    pub fn queue_id(&self) -> Option<String> {
        self.read().queue_id().map(str::to_string)
    }

    /// Replaces the footprint.
    pub fn set_shape(&self, shape: Shape) {
        self.write().shape = shape;
    }

    /// Switches the agency to [`Agency::Strict`].
    pub fn set_to_strict(&self) {
        self.write().agency = Agency::Strict;
    }

    /// Switches the agency to [`Agency::Autonomous`].
    pub fn set_to_autonomous(&self) {
        self.write().agency = Agency::Autonomous;
    }

    /// Switches the agency to [`Agency::Queued`] with the given queue.
    pub fn set_to_queued(&self, queue_id: impl Into<String>) {
        self.write().agency = Agency::Queued(queue_id.into());
    }

    /// Overwrites the whole profile value.
    pub fn replace(&self, profile: Profile) {
        *self.write() = profile;
    }

    /// Whether both handles refer to the same profile.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // A writer that panicked cannot leave a Profile half-written, so a
    // poisoned lock still holds a usable value.
    fn read(&self) -> RwLockReadGuard<'_, Profile> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Profile> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for ProfileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ProfileHandle {}

impl From<Profile> for ProfileHandle {
    fn from(profile: Profile) -> Self {
        Self::new(profile)
    }
}

impl fmt::Debug for ProfileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProfileHandle").field(&*self.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_agency() {
        let strict = ProfileHandle::strict(Shape::rectangle(1.0, 1.0));
        let queued = ProfileHandle::queued(Shape::circle(1.0), "5");

        assert_eq!(strict.agency(), Agency::Strict);
        assert_eq!(strict.queue_id(), None);
        assert_eq!(strict.shape(), Shape::rectangle(1.0, 1.0));

        assert_eq!(queued.agency(), Agency::Queued("5".into()));
        assert_eq!(queued.queue_id().as_deref(), Some("5"));
    }

    #[test]
    fn agency_setters() {
        let profile = ProfileHandle::strict(Shape::rectangle(1.0, 1.0));

        profile.set_to_autonomous();
        assert_eq!(profile.agency(), Agency::Autonomous);
        assert_eq!(profile.queue_id(), None);

        profile.set_to_queued("2");
        assert_eq!(profile.queue_id().as_deref(), Some("2"));

        profile.set_to_strict();
        assert_eq!(profile.agency(), Agency::Strict);
        assert_eq!(profile.queue_id(), None);
    }

    #[test]
    fn clones_share_the_profile() {
        let original = ProfileHandle::strict(Shape::circle(1.0));
        let alias = original.clone();

        alias.set_shape(Shape::circle(2.0));
        alias.set_to_autonomous();

        assert_eq!(original.shape(), Shape::circle(2.0));
        assert_eq!(original.agency(), Agency::Autonomous);
        assert_eq!(original, alias);
    }

    #[test]
    fn equality_is_identity_not_value() {
        let a = ProfileHandle::strict(Shape::circle(1.0));
        let b = ProfileHandle::strict(Shape::circle(1.0));

        assert_eq!(a.snapshot(), b.snapshot());
        assert_ne!(a, b);
    }

    #[test]
    fn replace_overwrites_value_in_place() {
        let target = ProfileHandle::strict(Shape::rectangle(1.0, 1.0));
        let alias = target.clone();
        let source = ProfileHandle::queued(Shape::circle(1.0), "3");

        target.replace(source.snapshot());

        assert_eq!(alias.snapshot(), source.snapshot());
        assert_ne!(alias, source);
    }
}
