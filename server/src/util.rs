use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix seconds. Lifecycle deadlines are absolute
/// timestamps in this domain so they can travel in LIFECYCLE_CHANGE packets.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Normalizes a vector, returning the zero vector for a zero input.
pub fn normalize(x: f32, y: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 0.0 {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_now_secs_advances() {
        let a = now_secs();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = now_secs();
        assert!(b > a);
    }

    #[test]
    fn test_normalize() {
        let (x, y) = normalize(3.0, 4.0);
        assert_approx_eq!(x, 0.6, 0.0001);
        assert_approx_eq!(y, 0.8, 0.0001);

        assert_eq!(normalize(0.0, 0.0), (0.0, 0.0));
    }
}
