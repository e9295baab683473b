//! End-to-end tests of the onesweep engine. The sorting scenarios mirror the
//! 4-phase suite; the lookback spine and the shared histogram sweep get their
//! own checks.

mod common;

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gpu_sorting::{
    KeyType, OneSweepSorter, PayloadType, SortConfig, SortOrder, PARTITION_SIZE, RADIX,
};

fn gpu_sort<T: bytemuck::Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    config: SortConfig,
    keys: &[T],
    payloads: Option<&[u32]>,
) -> (Vec<T>, Option<Vec<u32>>) {
    let count = keys.len() as u32;
    let sorter = OneSweepSorter::new(device, config);
    let buffers = sorter.create_sort_buffers(device, count);

    let keys_buffer = common::storage_buffer(device, keys);
    let payload_buffer = payloads.map(|p| common::storage_buffer(device, p));
    let bindings = sorter.bind(device, &buffers, &keys_buffer, payload_buffer.as_ref());
    sorter.sort(
        device,
        queue,
        &bindings,
        &buffers,
        &keys_buffer,
        payload_buffer.as_ref(),
        count,
    );

    let sorted = common::download(&keys_buffer, device, queue);
    let sorted_payloads = payload_buffer
        .as_ref()
        .map(|b| common::download(b, device, queue));
    (sorted, sorted_payloads)
}

fn expect_sorted<T: bytemuck::Pod>(
    keys: &[T],
    config: SortConfig,
    cmp: impl Fn(&T, &T) -> Ordering,
) {
    let (device, queue) = require_device!();
    let payloads: Vec<u32> = (0..keys.len() as u32).collect();
    let (sorted, sorted_payloads) = gpu_sort(
        &device,
        &queue,
        config,
        keys,
        config.is_pairs().then_some(payloads.as_slice()),
    );

    let mut expected: Vec<(T, u32)> = keys.iter().copied().zip(0..keys.len() as u32).collect();
    expected.sort_by(|a, b| {
        let o = cmp(&a.0, &b.0);
        if config.ascending() {
            o
        } else {
            o.reverse()
        }
    });

    for (i, (got, want)) in sorted.iter().zip(expected.iter()).enumerate() {
        assert!(
            cmp(got, &want.0) == Ordering::Equal,
            "key mismatch at index {i}"
        );
    }
    if let Some(sorted_payloads) = sorted_payloads {
        let want: Vec<u32> = expected.iter().map(|(_, p)| *p).collect();
        assert_eq!(sorted_payloads, want, "payload permutation mismatch");
    }
}

#[test]
fn small_known_sequence_ascending() {
    let (device, queue) = require_device!();
    let keys: Vec<u32> = vec![5, 3, 5, 1, 4, 2];
    let payloads: Vec<u32> = (0..6).collect();
    let config = SortConfig::pairs(KeyType::U32, PayloadType::U32, SortOrder::Ascending);
    let (sorted, sorted_payloads) = gpu_sort(&device, &queue, config, &keys, Some(&payloads));
    assert_eq!(sorted, vec![1, 2, 3, 4, 5, 5]);
    assert_eq!(sorted_payloads.unwrap(), vec![3, 5, 1, 4, 0, 2]);
}

#[test]
fn small_known_sequence_descending() {
    let (device, queue) = require_device!();
    let keys: Vec<u32> = vec![5, 3, 5, 1, 4, 2];
    let payloads: Vec<u32> = (0..6).collect();
    let config = SortConfig::pairs(KeyType::U32, PayloadType::U32, SortOrder::Descending);
    let (sorted, sorted_payloads) = gpu_sort(&device, &queue, config, &keys, Some(&payloads));
    assert_eq!(sorted, vec![5, 5, 4, 3, 2, 1]);
    // stable descending: key 2 comes from index 5 and key 1 from index 3
    assert_eq!(sorted_payloads.unwrap(), vec![0, 2, 4, 1, 5, 3]);
}

#[test]
fn single_element() {
    let (device, queue) = require_device!();
    let config = SortConfig::keys(KeyType::U32, SortOrder::Ascending);
    let (sorted, _) = gpu_sort::<u32>(&device, &queue, config, &[7], None);
    assert_eq!(sorted, vec![7]);
}

#[test]
fn random_u32_large() {
    let mut rng = StdRng::seed_from_u64(20);
    // enough partitions that lookbacks regularly cross tile boundaries
    let keys: Vec<u32> = (0..1_000_000).map(|_| rng.gen()).collect();
    expect_sorted(&keys, SortConfig::keys(KeyType::U32, SortOrder::Ascending), u32::cmp);
}

#[test]
fn random_u32_pairs() {
    let mut rng = StdRng::seed_from_u64(21);
    let keys: Vec<u32> = (0..100_000).map(|_| rng.gen()).collect();
    expect_sorted(
        &keys,
        SortConfig::pairs(KeyType::U32, PayloadType::U32, SortOrder::Ascending),
        u32::cmp,
    );
}

#[test]
fn random_i32_descending() {
    let mut rng = StdRng::seed_from_u64(22);
    let keys: Vec<i32> = (0..50_000).map(|_| rng.gen()).collect();
    expect_sorted(
        &keys,
        SortConfig::keys(KeyType::I32, SortOrder::Descending),
        i32::cmp,
    );
}

#[test]
fn random_f32_pairs() {
    let mut rng = StdRng::seed_from_u64(23);
    let keys: Vec<f32> = (0..50_000).map(|_| rng.gen_range(-1.0e6f32..1.0e6)).collect();
    expect_sorted(
        &keys,
        SortConfig::pairs(KeyType::F32, PayloadType::F32, SortOrder::Ascending),
        |a, b| a.total_cmp(b),
    );
}

#[test]
fn random_u64_all_eight_passes() {
    let mut rng = StdRng::seed_from_u64(24);
    let keys: Vec<u64> = (0..50_000).map(|_| rng.gen()).collect();
    expect_sorted(&keys, SortConfig::keys(KeyType::U64, SortOrder::Ascending), u64::cmp);
}

#[test]
fn skewed_digits_single_bin() {
    // every key shares every digit, so one spine row carries the whole count
    let (device, queue) = require_device!();
    let keys = vec![0xdeadbeefu32; (2 * PARTITION_SIZE) as usize];
    let config = SortConfig::keys(KeyType::U32, SortOrder::Ascending);
    let (sorted, _) = gpu_sort(&device, &queue, config, &keys, None);
    assert_eq!(sorted, keys);
}

#[test]
fn global_hist_conserves_count_in_every_pass_row() {
    let (device, queue) = require_device!();
    let mut rng = StdRng::seed_from_u64(25);
    let count = 3 * PARTITION_SIZE + 41;
    let keys: Vec<u32> = (0..count).map(|_| rng.gen()).collect();

    let config = SortConfig::keys(KeyType::U32, SortOrder::Ascending);
    let sorter = OneSweepSorter::new(&device, config);
    let buffers = sorter.create_sort_buffers(&device, count);
    let keys_buffer = common::storage_buffer(&device, &keys);
    let bindings = sorter.bind(&device, &buffers, &keys_buffer, None);

    buffers.write_count(&queue, count);
    let mut encoder = device.create_command_encoder(&Default::default());
    sorter.record_init(&bindings, &mut encoder);
    sorter.record_global_hist(&bindings, count, &mut encoder);
    let idx = queue.submit([encoder.finish()]);
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

    let hist: Vec<u32> = common::download(buffers.global_hist(), &device, &queue);
    for pass in 0..config.passes() as usize {
        let row: u32 = hist[pass * RADIX as usize..(pass + 1) * RADIX as usize]
            .iter()
            .sum();
        assert_eq!(row, count, "pass {pass} digit counts must sum to the key count");
    }
}

#[test]
fn indirect_sort_reads_count_from_gpu() {
    let (device, queue) = require_device!();
    let mut rng = StdRng::seed_from_u64(26);
    let count = PARTITION_SIZE + 7;
    let keys: Vec<u32> = (0..count).map(|_| rng.gen()).collect();

    let config = SortConfig::keys(KeyType::U32, SortOrder::Ascending);
    let sorter = OneSweepSorter::new(&device, config);
    let buffers = sorter.create_sort_buffers(&device, count);
    let keys_buffer = common::storage_buffer(&device, &keys);
    let bindings = sorter.bind(&device, &buffers, &keys_buffer, None);

    let count_buffer = common::storage_buffer(&device, &[count]);

    let mut encoder = device.create_command_encoder(&Default::default());
    sorter.record_prepare_indirect(&bindings, &buffers, &count_buffer, 0, &mut encoder);
    sorter.record_sort_indirect(&bindings, &buffers, &mut encoder);
    let idx = queue.submit([encoder.finish()]);
    device.poll(wgpu::Maintain::WaitForSubmissionIndex(idx));

    let sorted: Vec<u32> = common::download(&keys_buffer, &device, &queue);
    let mut expected = keys.clone();
    expected.sort();
    assert_eq!(sorted, expected);
}
