//! Domain types and display projection for itinerary collections.

pub mod types;
pub mod view;
