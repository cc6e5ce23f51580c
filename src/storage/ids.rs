use rand::{rng, Rng};

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Record id: creation time in Unix milliseconds plus a random base-36 suffix.
///
/// The suffix keeps ids unique when several records are created in the same millisecond,
/// which happens whenever one card is filed into many decks or a batch is seeded.
pub(crate) fn generate(now_millis: i64) -> String {
    generate_with_rng(now_millis, &mut rng())
}

pub(crate) fn generate_with_rng<R: Rng>(now_millis: i64, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect();
    format!("{now_millis}-{suffix}")
}
