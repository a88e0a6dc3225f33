use std::time::{Duration, Instant};

/// Poll `connect` until it succeeds or `timeout` elapses.
///
/// Returns the last error once the deadline has passed. `connect` is always
/// called at least once.
pub fn wait_for_resource_until<F, T, E>(
    mut connect: F,
    poll_interval: Duration,
    timeout: Duration,
    resource_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let deadline = Instant::now() + timeout;
    loop {
        match connect() {
            Ok(resource) => {
                tracing::info!("{} connected", resource_name);
                return Ok(resource);
            }
            Err(e) if Instant::now() >= deadline => {
                tracing::warn!("Gave up waiting for {} after {:?}: {}", resource_name, timeout, e);
                return Err(e);
            }
            Err(e) => {
                tracing::debug!("Waiting for {} ({})", resource_name, e);
                std::thread::sleep(poll_interval);
            }
        }
    }
}

#[cfg(feature = "async")]
pub async fn wait_for_resource_until_async<F, T, E>(
    mut connect: F,
    poll_interval: Duration,
    timeout: Duration,
    resource_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let deadline = Instant::now() + timeout;
    loop {
        match connect() {
            Ok(resource) => {
                tracing::info!("{} connected", resource_name);
                return Ok(resource);
            }
            Err(e) if Instant::now() >= deadline => {
                tracing::warn!("Gave up waiting for {} after {:?}: {}", resource_name, timeout, e);
                return Err(e);
            }
            Err(e) => {
                tracing::debug!("Waiting for {} ({})", resource_name, e);
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_once_resource_appears() {
        let mut calls = 0;
        let result: Result<u32, String> = wait_for_resource_until(
            || {
                calls += 1;
                if calls < 3 { Err("not yet".to_string()) } else { Ok(7) }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
            "counter",
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_with_last_error() {
        let mut calls = 0;
        let result: Result<(), String> = wait_for_resource_until(
            || {
                calls += 1;
                Err(format!("attempt {}", calls))
            },
            Duration::from_millis(1),
            Duration::from_millis(20),
            "missing",
        );
        assert_eq!(result, Err(format!("attempt {}", calls)));
        assert!(calls >= 1);
    }

    #[test]
    fn test_zero_timeout_still_tries_once() {
        let result: Result<&str, &str> =
            wait_for_resource_until(|| Ok("ready"), Duration::ZERO, Duration::ZERO, "instant");
        assert_eq!(result, Ok("ready"));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_returns_once_resource_appears() {
        let mut calls = 0;
        let result: Result<u32, String> = wait_for_resource_until_async(
            || {
                calls += 1;
                if calls < 2 { Err("not yet".to_string()) } else { Ok(1) }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
            "counter",
        )
        .await;
        assert_eq!(result, Ok(1));
    }
}
