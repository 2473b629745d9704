/// Number of leading bytes to zero so that a payload of `len` bytes
/// compresses roughly `compressibility`-fold.
///
/// `round(len / compressibility)` bytes are kept as generated; the rest
/// become zero. A factor below `1.0` keeps every byte.
#[inline]
pub fn compressible_len(len: usize, compressibility: f64) -> usize {
    let random_len = (len as f64 / compressibility).round();
    if random_len.is_nan() || random_len >= len as f64 {
        0
    } else {
        len - random_len as usize
    }
}

/// Shapes a synthetic payload so a storage engine's compressor sees the
/// requested compressibility.
///
/// The leading [`compressible_len`] bytes are overwritten with zeros and the
/// trailing bytes are left untouched. This is not a compressor; it only makes
/// a generated value trivially compressible by a known factor. The result
/// depends on nothing but `data` and `compressibility`.
///
/// # Examples
///
/// ```rust,ignore
/// let shaped = apply_compressibility(vec![7u8; 10], 2.0);
/// assert_eq!(shaped, vec![0, 0, 0, 0, 0, 7, 7, 7, 7, 7]);
/// ```
pub fn apply_compressibility(mut data: Vec<u8>, compressibility: f64) -> Vec<u8> {
    let zeroed = compressible_len(data.len(), compressibility);
    data[..zeroed].fill(0);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_factor_one_is_identity() {
        let data: Vec<u8> = (1..=32).collect();
        assert_eq!(apply_compressibility(data.clone(), 1.0), data);
    }

    #[test]
    fn test_factor_two_zeroes_half() {
        let shaped = apply_compressibility(vec![7u8; 10], 2.0);
        assert_eq!(shaped, vec![0, 0, 0, 0, 0, 7, 7, 7, 7, 7]);
    }

    #[test]
    fn test_rounding_half_up() {
        // 5 / 2 = 2.5 rounds to 3 kept bytes
        assert_eq!(compressible_len(5, 2.0), 2);
        // 10 / 3 = 3.33 rounds to 3 kept bytes
        assert_eq!(compressible_len(10, 3.0), 7);
        // 10 / 4 = 2.5 rounds to 3 kept bytes
        assert_eq!(compressible_len(10, 4.0), 7);
    }

    #[test]
    fn test_factor_below_one_keeps_everything() {
        let data = vec![9u8; 8];
        assert_eq!(compressible_len(8, 0.5), 0);
        assert_eq!(apply_compressibility(data.clone(), 0.5), data);
    }

    #[test]
    fn test_empty_payload() {
        assert!(apply_compressibility(Vec::new(), 10.0).is_empty());
    }

    #[test]
    fn test_huge_factor_zeroes_all_but_rounding() {
        assert_eq!(compressible_len(100, 1_000.0), 100);
        assert_eq!(compressible_len(100, 150.0), 99);
    }

    #[test]
    fn test_prefix_zero_suffix_preserved() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let len = rng.gen_range(0..512);
            let factor = rng.gen_range(1.0..20.0);
            let data: Vec<u8> = (0..len).map(|_| rng.gen_range(1..=255)).collect();

            let shaped = apply_compressibility(data.clone(), factor);
            let kept = (len as f64 / factor).round() as usize;
            let zeroed = len - kept;

            assert_eq!(shaped.len(), len);
            assert!(shaped[..zeroed].iter().all(|b| *b == 0));
            assert_eq!(&shaped[zeroed..], &data[zeroed..]);
        }
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..100u8).collect();
        let first = apply_compressibility(data.clone(), 3.7);
        let second = apply_compressibility(data, 3.7);
        assert_eq!(first, second);
    }
}
