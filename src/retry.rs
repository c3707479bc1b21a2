/// Outcome of a bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry<T> {
    /// `accept` held for `value` on attempt number `attempts`.
    Accepted { value: T, attempts: usize },
    /// Every attempt was rejected, carries the last value.
    Exhausted(T),
}

impl<T> Retry<T> {
    /// Value that stopped the loop, accepted or not.
    pub fn into_inner(self) -> T {
        match self {
            Retry::Accepted { value, .. } | Retry::Exhausted(value) => value,
        }
    }
}

/// Runs `attempt` until `accept` holds or `max_attempts` attempts were made.
///
/// The first attempt is always made. Errors from `attempt` end the loop at once.
pub fn retry<T, E, F, P>(max_attempts: usize, mut attempt: F, accept: P) -> Result<Retry<T>, E>
where
    F: FnMut(usize) -> Result<T, E>,
    P: Fn(&T) -> bool,
{
    let mut attempts = 1;
    let mut value = attempt(attempts)?;

    while !accept(&value) {
        if attempts >= max_attempts {
            return Ok(Retry::Exhausted(value));
        }

        attempts += 1;
        value = attempt(attempts)?;
    }

    Ok(Retry::Accepted { value, attempts })
}
