/// Map type used by the loader and the owner registry. Keys are handles and paths we allocate
/// ourselves, so the faster non-DoS-resistant hasher is fine.
pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
/// Set counterpart of [`HashMap`]
pub type HashSet<T> = std::collections::HashSet<T, ahash::RandomState>;
