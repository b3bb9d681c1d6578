//! Class communities: members, birthdays, collections and contributor rows.

pub mod birthdays;
pub mod dashboard;
pub mod events;
pub mod import;
pub mod manage;
pub mod models;
pub mod onboarding;
pub mod progress;
pub mod slug;
pub mod sync;

pub use dashboard::{AdminStats, DashboardView, admin_stats, load_dashboard};
pub use models::{ActiveEvent, Community, Contributor, Event, Member};
