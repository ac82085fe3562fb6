//! Remote automation protocol client
//!
//! Drives browsers and native UIs through vendor driver servers over the W3C
//! WebDriver wire protocol, with the W3C Actions API for synthesized input and
//! the Chrome DevTools Protocol over WebSocket as a side channel.
//!
//! # Layout
//!
//! 1. **Wire plumbing**: [`command`] route templates, [`executor`] HTTP
//!    transport, [`response`] envelope and error table
//! 2. **Process lifecycle**: [`service`] spawns a driver, reserves its port,
//!    polls `/status`
//! 3. **Composition**: [`RemoteDriver`] holds registry, executor and session;
//!    [`ChromiumDriver`] adds [`DevTools`] on top instead of subclassing
//! 4. **Side channels**: [`actions`] encoder, [`cdp`] socket client, [`wait`]
//!    polling primitive

pub mod actions;
pub mod capabilities;
pub mod cdp;
pub mod chromium;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod response;
pub mod service;
pub mod vendor;
pub mod wait;

pub use actions::ActionSequence;
pub use capabilities::options::{ChromiumOptions, FirefoxOptions, LogLevel, UiaOptions, VendorOptions};
pub use capabilities::{Capabilities, SessionRequest};
pub use cdp::{CdpConnection, CdpSession};
pub use chromium::{ChromiumDriver, DevTools};
pub use command::{CommandDescriptor, CommandRegistry, Method};
pub use config::{ExecutorConfig, ServiceConfig};
pub use driver::{ElementRef, Invoker, Overrides, RemoteDriver, SessionContext};
pub use error::{ErrorKind, Result, WebDriverError};
pub use events::{EventBus, ServiceEvent};
pub use response::ResponseEnvelope;
pub use service::{DriverService, ServiceState};
pub use vendor::{Chromium, Firefox, Uia, Vendor};
pub use wait::{Check, Wait};
