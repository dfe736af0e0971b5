//! Weather screen for SkyCast
//!
//! Acquires the device position, fetches current conditions over HTTP and
//! keeps them fresh on refresh requests and location changes.

pub mod location;
pub mod provider;
pub mod screen;
pub mod sources;
pub mod types;
pub mod view;

pub use location::{
    is_significant_change, LocationMonitor, MonitorState, PermissionStatus, PositionSource,
    WatchOptions,
};
pub use provider::WeatherProvider;
pub use screen::{Command, ScreenState, Trigger, WeatherScreen};
pub use sources::{ChannelSource, FixedSource, IpLocator};
pub use types::*;
