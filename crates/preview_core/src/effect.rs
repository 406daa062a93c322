/// Side effects requested by [`crate::update`]; the front end performs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Enrich these URLs, in this order. Each URL appears once.
    Enrich { urls: Vec<String> },
    /// Cancel the running batch.
    Cancel,
}
