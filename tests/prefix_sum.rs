//! Tests of the standalone reduce-then-scan prefix sum pipeline.

mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpu_sorting::GpuPrefixSum;

fn gpu_scan(values: &[u32], inclusive: bool) -> Option<Vec<u32>> {
    let (device, queue) = match common::create_device() {
        Some(dq) => dq,
        None => return None,
    };
    let scan = GpuPrefixSum::new(&device);
    let buffers = scan.create_scan_buffers(&device, values.len() as u32);
    let input = common::storage_buffer(&device, values);
    let output = common::storage_buffer(&device, &vec![0u32; values.len()]);
    let bind_group = scan.bind(&device, &buffers, &input, &output);
    if inclusive {
        scan.inclusive(&device, &queue, &buffers, &bind_group, values.len() as u32);
    } else {
        scan.exclusive(&device, &queue, &buffers, &bind_group, values.len() as u32);
    }
    Some(common::download(&output, &device, &queue))
}

fn cpu_inclusive(values: &[u32]) -> Vec<u32> {
    values
        .iter()
        .scan(0u32, |acc, v| {
            *acc = acc.wrapping_add(*v);
            Some(*acc)
        })
        .collect()
}

#[test]
fn inclusive_scan_of_ones() {
    let ones = vec![1u32; 21];
    let Some(scanned) = gpu_scan(&ones, true) else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    let expected: Vec<u32> = (1..=21).collect();
    assert_eq!(scanned, expected);
}

#[test]
fn exclusive_scan_of_ones() {
    let ones = vec![1u32; 21];
    let Some(scanned) = gpu_scan(&ones, false) else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    let expected: Vec<u32> = (0..21).collect();
    assert_eq!(scanned, expected);
}

#[test]
fn single_element_scans() {
    let Some(incl) = gpu_scan(&[9], true) else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    assert_eq!(incl, vec![9]);
    assert_eq!(gpu_scan(&[9], false).unwrap(), vec![0]);
}

#[test]
fn inclusive_scan_random_multi_tile() {
    let mut rng = StdRng::seed_from_u64(30);
    // not a multiple of the tile size, spans enough tiles to chunk the spine
    let values: Vec<u32> = (0..100_003).map(|_| rng.gen_range(0..16)).collect();
    let Some(scanned) = gpu_scan(&values, true) else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    assert_eq!(scanned, cpu_inclusive(&values));
}

#[test]
fn exclusive_scan_random() {
    let mut rng = StdRng::seed_from_u64(31);
    let values: Vec<u32> = (0..10_000).map(|_| rng.gen_range(0..100)).collect();
    let Some(scanned) = gpu_scan(&values, false) else {
        eprintln!("no GPU adapter available, skipping");
        return;
    };
    let incl = cpu_inclusive(&values);
    let expected: Vec<u32> = std::iter::once(0)
        .chain(incl[..incl.len() - 1].iter().copied())
        .collect();
    assert_eq!(scanned, expected);
}
