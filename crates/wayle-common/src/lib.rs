//! Common utilities shared across Wayle services.
//!
//! Provides the [`Property`] reactive primitive used to expose observable
//! state without tying callers to any particular transport.

mod property;

pub use property::{ComputedProperty, Property, PropertyStream, SubscribeChanges};
