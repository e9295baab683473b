use std::cmp::Ordering;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use gpu_sorting::utils::download_buffer;
use gpu_sorting::{
    GpuRadixSorter, KeyType, OneSweepSorter, PayloadType, SortConfig, SortOrder,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyArg {
    U32,
    I32,
    F32,
    U64,
}

/// Sorts random keys on the GPU and checks the result against a host sort.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Number of keys to sort
    #[arg(long, short = 'n', default_value_t = 1_000_000)]
    count: u32,

    /// Key type
    #[arg(long, value_enum, default_value_t = KeyArg::U32)]
    key_type: KeyArg,

    /// Sort largest first
    #[arg(long)]
    descending: bool,

    /// Carry an index payload with every key
    #[arg(long)]
    pairs: bool,

    /// Use the onesweep engine instead of the 4-phase one
    #[arg(long)]
    onesweep: bool,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[pollster::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("no suitable GPU adapter found"))?;
    log::info!("using adapter: {:?}", adapter.get_info().name);
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        )
        .await?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    match args.key_type {
        KeyArg::U32 => {
            run(&device, &queue, &args, KeyType::U32, || rng.gen::<u32>(), u32::cmp).await
        }
        KeyArg::I32 => {
            run(&device, &queue, &args, KeyType::I32, || rng.gen::<i32>(), i32::cmp).await
        }
        KeyArg::F32 => {
            run(
                &device,
                &queue,
                &args,
                KeyType::F32,
                || rng.gen_range(-1.0e6f32..1.0e6),
                |a: &f32, b| a.total_cmp(b),
            )
            .await
        }
        KeyArg::U64 => {
            run(&device, &queue, &args, KeyType::U64, || rng.gen::<u64>(), u64::cmp).await
        }
    }
}

async fn run<T, G, C>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    args: &Args,
    key_type: KeyType,
    mut gen: G,
    cmp: C,
) -> anyhow::Result<()>
where
    T: bytemuck::Pod + std::fmt::Debug,
    G: FnMut() -> T,
    C: Fn(&T, &T) -> Ordering,
{
    let order = if args.descending {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    let config = if args.pairs {
        SortConfig::pairs(key_type, PayloadType::U32, order)
    } else {
        SortConfig::keys(key_type, order)
    };

    let count = args.count;
    let keys: Vec<T> = (0..count).map(|_| gen()).collect();
    let payloads: Vec<u32> = (0..count).collect();

    let keys_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("demo keys"),
        contents: bytemuck::cast_slice(&keys),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
    });
    let payload_buffer = args.pairs.then(|| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("demo payloads"),
            contents: bytemuck::cast_slice(&payloads),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        })
    });

    let elapsed = if args.onesweep {
        let sorter = OneSweepSorter::new(device, config);
        let buffers = sorter.create_sort_buffers(device, count);
        let bindings = sorter.bind(device, &buffers, &keys_buffer, payload_buffer.as_ref());
        let start = Instant::now();
        sorter.sort(device, queue, &bindings, &buffers, &keys_buffer, payload_buffer.as_ref(), count);
        start.elapsed()
    } else {
        let sorter = GpuRadixSorter::new(device, config);
        let buffers = sorter.create_sort_buffers(device, count);
        let bindings = sorter.bind(device, &buffers, &keys_buffer, payload_buffer.as_ref());
        let start = Instant::now();
        sorter.sort(device, queue, &bindings, &buffers, &keys_buffer, payload_buffer.as_ref(), count);
        start.elapsed()
    };

    let sorted: Vec<T> = download_buffer(&keys_buffer, device, queue).await?;

    // host reference, stable so the payload permutation is determined
    let mut expected: Vec<(T, u32)> = keys.iter().copied().zip(0..count).collect();
    expected.sort_by(|a, b| {
        let o = cmp(&a.0, &b.0);
        if args.descending {
            o.reverse()
        } else {
            o
        }
    });

    let mut mismatches = 0usize;
    for (i, (got, want)) in sorted.iter().zip(expected.iter()).enumerate() {
        if cmp(got, &want.0) != Ordering::Equal {
            if mismatches == 0 {
                log::error!("first key mismatch at {i}: got {got:?}, want {:?}", want.0);
            }
            mismatches += 1;
        }
    }
    if let Some(payload_buffer) = &payload_buffer {
        let sorted_payloads: Vec<u32> = download_buffer(payload_buffer, device, queue).await?;
        for (i, (got, want)) in sorted_payloads.iter().zip(expected.iter()).enumerate() {
            if *got != want.1 {
                if mismatches == 0 {
                    log::error!("first payload mismatch at {i}: got {got}, want {}", want.1);
                }
                mismatches += 1;
            }
        }
    }

    anyhow::ensure!(mismatches == 0, "{mismatches} mismatches against host sort");
    let engine = if args.onesweep { "onesweep" } else { "4-phase" };
    println!(
        "sorted {} {:?} keys{} ({engine}) in {:.2?}",
        count,
        key_type,
        if args.pairs { " + payloads" } else { "" },
        elapsed
    );
    Ok(())
}
