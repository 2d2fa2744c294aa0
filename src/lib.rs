//! An aggregation engine for metered energy readings.
//!
//! A reading is a quantity (e.g. kWh) consumed by one meter over a half-open
//! interval `[start, end)` of epoch milliseconds. Readings may be of any length,
//! may overlap and may leave gaps. The engine turns them into:
//!
//! - compressed series: a bounded number of equal-width buckets of average rate
//!   (quantity per hour), suited for charts
//! - bar series: calendar-aligned (UTC) buckets of prorated totals
//! - comparisons: usage since a point in time vs. the period before it
//! - rollups: sparse per-minute/hour/day/week rate rows
//!
//! Each query runs for a list of meters and groups of meters. Readings come from a
//! [`ReadingSource`], group memberships from a [`GroupResolver`], which may be an
//! external database, the in-memory [`MemorySource`] or the embedded
//! [`ReadingStore`] built on <https://github.com/fjall-rs/fjall>.
//!
//! ```
//! use meterwise::{BarWidth, Duration, Engine, Entity, MemorySource, Reading};
//!
//! let mut source = MemorySource::default();
//! source.insert(Reading::new(1, 10.0, 0, Duration::hours(6))?);
//! source.insert(Reading::new(1, 20.0, Duration::hours(6), Duration::hours(18))?);
//! source.insert(Reading::new(2, 24.0, 0, Duration::days(1))?);
//! source.set_group(100, [1, 2]);
//!
//! let engine = Engine::new(&source, &source);
//!
//! let rates = engine
//!     .compressed(&[Entity::Meter(2)])
//!     .start(0)
//!     .end(Duration::days(1))
//!     .points(2)
//!     // use .cancellation() to stop long running queries between entities
//!     .run()?
//!     .collect()?;
//!
//! // 24 kWh over one day is 1 kW
//! for bucket in &rates[&Entity::Meter(2)] {
//!     assert_eq!(Some(1.0), bucket.value);
//! }
//!
//! let bars = engine
//!     .bars(&[Entity::Meter(1), Entity::Group(100)], BarWidth::Days(1))
//!     .start(0)
//!     .end(Duration::days(1))
//!     .run()?
//!     .collect()?;
//!
//! assert_eq!(30.0, bars[&Entity::Meter(1)][0].value);
//! assert_eq!(54.0, bars[&Entity::Group(100)][0].value);
//!
//! # Ok::<(), meterwise::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![warn(clippy::result_unit_err)]

mod agg;
mod compare;
mod duration;
mod engine;
mod engine_builder;
mod entity;
mod error;
mod interval;
pub mod planner;
mod query;
mod reading;
mod source;
mod store;
mod store_builder;
mod time;

type HashMap<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;

/// Milliseconds since the Unix epoch, UTC
pub type Timestamp = i64;

/// Quantity or rate of a reading
pub type Value = f64;

pub use agg::{
    group::Grouped,
    rate::Rate,
    rollup::rollup,
    stream::{Aggregation, Distributor},
    sum::Sum,
    Bucket,
};
pub use compare::{CompareResult, CompareWindows};
pub use duration::Duration;
pub use engine::{Cancellation, Engine};
pub use engine_builder::EngineBuilder;
pub use entity::{Entity, GroupId, MeterId};
pub use error::{Error, Result};
pub use interval::{overlap, prorate, Interval, TimeRange};
pub use planner::{BarWidth, Plan, Precision};
pub use query::{CompareQuery, RollupQuery, SeriesQuery};
pub use reading::Reading;
pub use source::{GroupResolver, MemorySource, ReadingSource};
pub use store::ReadingStore;
pub use store_builder::StoreBuilder;
pub use time::timestamp;
