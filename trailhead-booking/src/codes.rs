use rand::Rng;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Customer-facing booking reference, e.g. `TH-7KQ2M9XA`.
pub fn booking_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, random_code(8))
}

/// Ticket validation code, e.g. `TKT-4F8Q...` (16 characters after the prefix).
pub fn validation_code() -> String {
    format!("TKT-{}", random_code(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = booking_reference("TH");
        let (prefix, code) = reference.split_once('-').unwrap();
        assert_eq!(prefix, "TH");
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn test_validation_codes_are_unique() {
        let a = validation_code();
        let b = validation_code();
        assert!(a.starts_with("TKT-"));
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
