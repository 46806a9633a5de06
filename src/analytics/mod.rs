//! Analytics over the warehouse: RFM segmentation, rule-based insights,
//! dashboard aggregates and the discount simulator

pub mod insights;
pub mod rfm;
pub mod simulator;
pub mod views;

pub use insights::{generate_insights, load_insight_rows, Finding, InsightRow};
pub use rfm::{classify, RfmEngine, RfmRecord, Segment, SegmentSummary};
pub use simulator::{DiscountBaseline, DiscountScenario};
