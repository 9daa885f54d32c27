pub mod exceedance_service;
pub mod flow_duration_service;
pub mod forecast_service;

pub use exceedance_service::{forecast_percent_table, ForecastPercentTable};
pub use flow_duration_service::{flow_duration_curve, FlowDurationCurve};
pub use forecast_service::ForecastService;
