use stripemap::HashMap;

use rayon::prelude::*;

fn main() {
    const NUM_KEYS: usize = 10_000_000;

    let map = HashMap::new();

    (0..NUM_KEYS).into_par_iter().for_each(|i| map.set(i, i));

    assert_eq!(map.get_n_keys(), NUM_KEYS);
    assert!(map.get_n_buckets() >= NUM_KEYS);

    let max = map.map_reduce(|_, v| *v, |a, b| a.max(b), 0);
    assert_eq!(max, NUM_KEYS - 1);

    let sum = map.map_reduce(|_, v| *v as u64, |a, b| a + b, 0);
    assert_eq!(sum, (NUM_KEYS as u64 - 1) * NUM_KEYS as u64 / 2);

    println!(
        "inserted {} keys into {} buckets (load factor {:.3})",
        map.get_n_keys(),
        map.get_n_buckets(),
        map.get_load_factor()
    );
}
