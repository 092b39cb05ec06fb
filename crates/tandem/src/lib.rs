//! # TANDEM
//!
//! Fixed-step logic, variable-rate rendering, one graphics module between
//! them.
//!
//! ## Threads
//!
//! - **Logic thread**: owns [`LogicSide`] and runs [`FixedStepLoop`]. Writes
//!   transforms, publishes alpha and logic frame ids.
//! - **Render thread**: owns [`RenderSide`] inside a [`RenderLoop`]. Drains
//!   commands and closures, advances the destroy ring, interpolates.
//! - **Any other thread**: holds a [`ModuleHandle`] and enqueues commands,
//!   blocking if it needs the result.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tandem::{FixedStepLoop, GraphicsModule, MemoryScene, RenderLoop};
//! use tandem_core::FrameConfig;
//!
//! let config = FrameConfig::default();
//! let module = GraphicsModule::new(config.clone(), Arc::new(MemoryScene::new()))?;
//! let (mut logic, render) = module.into_parts();
//!
//! let render_thread = std::thread::spawn(move || RenderLoop::new(render).run(|_, _| {}));
//! FixedStepLoop::new(&config).run(&mut logic, |logic, _dt| {
//!     // game logic writes through `logic`
//! });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod game_loop;
pub mod logic;
pub mod module;
pub mod render;
pub mod render_loop;
pub mod scene;

pub use game_loop::{FixedStepLoop, LoopStats, StepReport, TickDriver};
pub use logic::LogicSide;
pub use module::{GraphicsModule, ModuleHandle};
pub use render::{RenderSide, RenderStats};
pub use render_loop::{FrameReport, RenderLoop};
pub use scene::{MemoryScene, MemoryTable};
