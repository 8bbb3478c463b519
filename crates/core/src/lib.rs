//! survey: wifi survey sessions for a mapping robot
//!
//! This crate drives timed data-collection sessions on a robot reached over
//! rosbridge. A [`SessionController`] starts and stops scan recording, cancels
//! navigation and triggers persistence of the map and trajectory artifacts.
//!
//! # Wiring
//!
//! ```ignore
//! use std::sync::Arc;
//! use survey::{SessionController, SurveyConfig, ros};
//! use survey_runtime::TransportSupervisor;
//!
//! let config = SurveyConfig::default();
//! let supervisor = TransportSupervisor::websocket(config.supervisor_config()?);
//! supervisor.connect();
//!
//! let collaborators = ros::collaborators(Arc::new(supervisor.clone()), &config);
//! let controller = SessionController::new(Arc::new(supervisor), collaborators, config.session_settings());
//! controller.start_exploration(map).await?;
//! // ...
//! controller.stop().await;
//! controller.flush_persistence().await;
//! ```
//!
//! Collaborators are traits ([`Scanner`], [`NavigationClient`],
//! [`MapPersister`], [`TrajectoryPersister`]); the [`ros`] module has the
//! rosbridge-backed implementations.

pub mod artifacts;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod model;
pub mod ros;
pub mod session;

pub use artifacts::ArtifactStore;
pub use collaborators::{Collaborators, MapPersister, NavigationClient, Scanner, TrajectoryPersister};
pub use config::SurveyConfig;
pub use error::{Error, Result, SessionError};
pub use model::{MapOrigin, MapRef, RecordingHandle, SessionMode};
pub use session::{SessionBridge, SessionController, SessionSettings, SessionStatus};
