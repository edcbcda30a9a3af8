use goal_insight_schemas::SentimentTrend;

/// Month-over-month change that must be exceeded to leave `Stable`.
pub const TREND_THRESHOLD: f64 = 0.1;

/// Absorbs float noise such as 0.8 - 0.7 = 0.10000000000000009.
const EPSILON: f64 = 1e-9;

/// Classify the sentiment trajectory against the prior month's score.
pub fn calc_trend(current: f64, previous: Option<f64>) -> SentimentTrend {
    let Some(previous) = previous else {
        return SentimentTrend::Stable;
    };

    let delta = current - previous;
    if delta > TREND_THRESHOLD + EPSILON {
        SentimentTrend::Improving
    } else if delta < -(TREND_THRESHOLD + EPSILON) {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    }
}
