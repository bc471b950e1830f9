/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the exponentially weighted mean of a series (span form)
///
/// `alpha = 2 / (span + 1)`. Weights are bias-adjusted: the value is
/// `sum((1-alpha)^i * x[n-1-i]) / sum((1-alpha)^i)`, so early values are not
/// pulled towards an arbitrary seed. Returns the mean at the last element.
pub fn calculate_ewm(prices: &[f64], span: usize) -> Option<f64> {
    if prices.is_empty() || span == 0 {
        return None;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;

    let mut weight = 1.0;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for price in prices.iter().rev() {
        weighted_sum += weight * price;
        weight_total += weight;
        weight *= decay;
    }

    Some(weighted_sum / weight_total)
}
