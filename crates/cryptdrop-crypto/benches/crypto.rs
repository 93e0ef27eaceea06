use cryptdrop_crypto::{decrypt, derive_key, encrypt, KdfParams};
use secrecy::SecretString;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let key = derive_key(&SecretString::from("bench-password"), &KdfParams::default());
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let key = derive_key(&SecretString::from("bench-password"), &KdfParams::default());
    let data = make_data(size);
    let container = encrypt(&data, &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&container), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1, 1000, 100000])]
fn bench_derive_key(bencher: divan::Bencher, iterations: u32) {
    let password = SecretString::from("bench-password");
    let params = KdfParams { iterations };
    bencher.bench(|| derive_key(divan::black_box(&password), divan::black_box(&params)));
}

fn main() {
    divan::main();
}
