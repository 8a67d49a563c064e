//! # popup-core
//!
//! Storefront engine for the sales popup app: "someone in Lyon just bought
//! this" notifications on a timed loop, plus a one-shot purchase-count badge
//! on product pages.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Time is virtual and host-driven.
//! - **Not thread-safe**: One page, one engine, one thread.
//! - **Graceful degradation**: Bad config, missing markup, or corrupt storage
//!   turn a feature off; they never break the host page.
//! - **Host-agnostic**: The page is reached only through [`Surface`] and
//!   storage only through [`KeyValueStore`].
//!
//! ## Components
//!
//! - [`config`]: payload validation and engine options
//! - [`dismissal`]: per-browser close counter and the popup gate
//! - [`cycler`]: round-robin over the activity feed
//! - [`scheduler`]: the wait/show/hide state machine
//! - [`badge`]: anchor probing and the count-up animation
//! - [`engine`]: [`PopupEngine`], which wires them to one timer queue
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use popup_core::{EngineOptions, FileStore, PopupEngine, StorageConfig, VirtualPage};
//!
//! let store = FileStore::open(&StorageConfig::default());
//! if let Some(mut engine) = PopupEngine::boot(payload, VirtualPage::blank(), store, &EngineOptions::default()) {
//!     engine.advance(std::time::Duration::from_secs(10));
//! }
//! ```

pub mod badge;
pub mod config;
pub mod cycler;
pub mod dismissal;
pub mod engine;
pub mod error;
pub mod page;
pub mod render;
pub mod scheduler;
pub mod selector;
pub mod storage;
pub mod surface;
pub mod timer;
pub mod types;

pub use badge::{ease_out_cubic, BadgeController, BadgePhase};
pub use config::{
    load_config, load_config_at, EngineOptions, LoadedConfig, DISMISSAL_STORAGE_KEY,
    DISMISSAL_THRESHOLD,
};
pub use cycler::ActivityCycler;
pub use dismissal::DismissalTracker;
pub use engine::{EngineTask, PopupEngine};
pub use error::{EngineError, Result};
pub use page::{Mutation, PageFixture, VirtualPage};
pub use render::{escape_html, BadgeView, PopupView};
pub use scheduler::{next_state, PopupInstance, PopupScheduler, SchedulerEvent};
pub use selector::{default_anchor_probes, AnchorProbe, ElementInfo, Selector};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageConfig};
pub use surface::{ElementId, Surface};
pub use timer::{TimerId, TimerQueue};
pub use types::*;
