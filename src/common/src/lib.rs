//! Domain model shared by the runtimes inventory ingestion pipeline.
//!
//! Everything in here is plain data: announcements describing where a telemetry snapshot lives,
//! the classified messages built from snapshot payloads, and the instance graph those messages
//! carry into the store.

pub mod announcement;
pub mod instance;
pub mod jar_hash;
pub mod message;

pub use announcement::Announcement;
pub use instance::app_server::{
    AppServerConfiguration, AppServerDeployment, AppServerExtension, AppServerInstance,
    ExtensionSubsystem,
};
pub use instance::{InstanceKind, JvmInstance};
pub use jar_hash::{JarHash, JarHashSet};
pub use message::{InsightsMessage, NewInstance, SourceKind, UpdateInstance};
