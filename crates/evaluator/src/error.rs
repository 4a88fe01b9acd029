use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("internal evaluator error: {0}")]
    Internal(String),
}

/// Non-fatal conditions hit while resolving an allocation for one day.
/// These never abort evaluation — spec treats them as warnings the caller
/// logs and surfaces alongside the result, not as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalWarning {
    /// An indicator needed more trailing history than was available
    /// (ticker hasn't reached inception, or not enough bars yet for the
    /// requested period). The node fell back to an equal split among its
    /// other children, or to the `if_false` branch for a condition.
    IndicatorLookbackUnavailable { ticker: String, detail: String },
}
