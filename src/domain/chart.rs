// Chart frame handed to the render callback
use super::scale::ScaleBounds;
use super::window::VisibleSeries;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartFrame {
    Data {
        labels: Vec<i64>,
        values: Vec<Option<f64>>,
        bounds: ScaleBounds,
    },
    /// Nothing to show: the window was just reset, or the backend answered
    /// without points for the selected range.
    NoData,
}

impl ChartFrame {
    pub fn from_series(series: VisibleSeries, bounds: ScaleBounds) -> Self {
        if series.is_empty() {
            return ChartFrame::NoData;
        }
        ChartFrame::Data {
            labels: series.labels,
            values: series.values,
            bounds,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChartFrame::NoData)
    }

    /// Most recent non-null reading
    pub fn latest_value(&self) -> Option<f64> {
        match self {
            ChartFrame::Data { values, .. } => values.iter().rev().find_map(|v| *v),
            ChartFrame::NoData => None,
        }
    }
}
