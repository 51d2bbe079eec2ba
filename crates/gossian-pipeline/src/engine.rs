//! Parallel convolution engine.
//!
//! A fixed pool of `W` identical workers pulls pixel coordinates from a
//! bounded work queue, computes the kernel-weighted average of the
//! pixel's neighbourhood, and pushes the result onto a second bounded
//! queue. Both queues hold at most `W` items.
//!
//! The calling thread acts as coordinator: it enumerates every pixel in
//! row-major order and writes results into the output raster as they
//! arrive. Because the result queue is bounded too, the coordinator
//! cannot simply submit everything and then collect. It drains ready
//! results after each submission, and blocks for one result whenever
//! `W` items are in flight, so neither queue can fill up while the
//! other side waits on it.
//!
//! Results carry their own coordinates and arrive in any order. Each
//! output cell is written exactly once, by the coordinator alone.
//!
//! A convolution can be abandoned midway through a shared flag. The
//! coordinator checks it before every submission; once it is set, both
//! queues are dropped, the workers drain out and the call returns
//! [`PipelineError::Cancelled`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use crate::kernel::Kernel;
use crate::raster::{BorderedRaster, Raster, Sampler};
use crate::types::{BlurConfig, BoundaryPolicy, PipelineError};

/// One pixel to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

/// The computed output sample for one [`WorkItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultItem {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Red, green, blue.
    pub rgb: [u8; 3],
}

/// Blur `image` with `kernel` using the boundary policy and pool size in
/// `config`.
///
/// For [`BoundaryPolicy::Mirror`] the mirrored border is built once,
/// before any worker starts.
///
/// # Errors
///
/// Returns [`PipelineError::WorkerPool`] if the pool hangs up before
/// every pixel has been computed, and [`PipelineError::Cancelled`] if
/// `cancel` is set before the last pixel is submitted.
pub fn blur(
    image: &Raster,
    kernel: &Kernel,
    config: &BlurConfig,
    cancel: &AtomicBool,
) -> Result<Raster, PipelineError> {
    match config.boundary {
        BoundaryPolicy::Clamp => {
            convolve(Sampler::Clamped(image), kernel, config.worker_count, cancel)
        }
        BoundaryPolicy::Mirror => {
            let bordered = BorderedRaster::mirrored(image, kernel.radius());
            convolve(Sampler::Mirrored(&bordered), kernel, config.worker_count, cancel)
        }
    }
}

/// Convolve every pixel reachable through `sampler` with `kernel`,
/// using `worker_count` workers (at least one).
///
/// The output has the dimensions of the unpadded image.
///
/// # Errors
///
/// Returns [`PipelineError::WorkerPool`] if the pool hangs up before
/// every pixel has been computed, and [`PipelineError::Cancelled`] if
/// `cancel` is set first.
pub fn convolve(
    sampler: Sampler<'_>,
    kernel: &Kernel,
    worker_count: usize,
    cancel: &AtomicBool,
) -> Result<Raster, PipelineError> {
    let (width, height) = sampler.dimensions();
    let mut output = Raster::new(width, height);
    if width == 0 || height == 0 {
        return Ok(output);
    }

    let capacity = worker_count.max(1);
    // With a padded raster every neighbour exists, so the denominator is
    // the same for every pixel.
    let full_mass = sampler.always_in_bounds().then(|| kernel.sum());

    tracing::debug!(
        width,
        height,
        workers = capacity,
        radius = kernel.radius(),
        "starting convolution"
    );

    let (work_tx, work_rx) = mpsc::sync_channel::<WorkItem>(capacity);
    let (result_tx, result_rx) = mpsc::sync_channel::<ResultItem>(capacity);
    let work_rx = Mutex::new(work_rx);

    thread::scope(|scope| {
        for _ in 0..capacity {
            let result_tx = result_tx.clone();
            let work_rx = &work_rx;
            scope.spawn(move || run_worker(sampler, kernel, full_mass, work_rx, &result_tx));
        }
        // Only workers hold senders now; the queue disconnects once all
        // of them have exited.
        drop(result_tx);

        coordinate(width, height, capacity, cancel, work_tx, result_rx, &mut output)
    })?;

    Ok(output)
}

/// Worker loop: runs until the work queue is closed and drained.
fn run_worker(
    sampler: Sampler<'_>,
    kernel: &Kernel,
    full_mass: Option<f64>,
    work: &Mutex<Receiver<WorkItem>>,
    results: &SyncSender<ResultItem>,
) {
    loop {
        let item = {
            let Ok(queue) = work.lock() else {
                return;
            };
            match queue.recv() {
                Ok(item) => item,
                Err(_) => return,
            }
        };

        let rgb = convolve_pixel(sampler, kernel, full_mass, item.x, item.y);
        let result = ResultItem {
            x: item.x,
            y: item.y,
            rgb,
        };
        if results.send(result).is_err() {
            return;
        }
    }
}

/// Submit every pixel and collect every result.
///
/// Takes ownership of both queue ends so that returning early, on any
/// path, disconnects them and lets the workers exit.
#[allow(clippy::needless_pass_by_value)]
fn coordinate(
    width: u32,
    height: u32,
    capacity: usize,
    cancel: &AtomicBool,
    work: SyncSender<WorkItem>,
    results: Receiver<ResultItem>,
    output: &mut Raster,
) -> Result<(), PipelineError> {
    let mut in_flight = 0_usize;

    for y in 0..height {
        for x in 0..width {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(x, y, in_flight, "convolution cancelled");
                return Err(PipelineError::Cancelled);
            }
            // At most `capacity - 1` items are in flight here, so the
            // work queue always has room.
            work.send(WorkItem { x, y })
                .map_err(|_| PipelineError::WorkerPool)?;
            in_flight += 1;

            while let Ok(result) = results.try_recv() {
                store(output, result);
                in_flight -= 1;
            }

            if in_flight >= capacity {
                let result = results.recv().map_err(|_| PipelineError::WorkerPool)?;
                store(output, result);
                in_flight -= 1;
            }
        }
    }

    // Close the work queue; workers exit once it is drained.
    drop(work);

    for _ in 0..in_flight {
        let result = results.recv().map_err(|_| PipelineError::WorkerPool)?;
        store(output, result);
    }

    Ok(())
}

fn store(output: &mut Raster, result: ResultItem) {
    output.put_pixel(result.x, result.y, image::Rgb(result.rgb));
}

/// Kernel-weighted average of the neighbourhood of `(x, y)`.
///
/// Neighbours the sampler cannot supply are skipped, together with
/// their weight. `full_mass`, when present, replaces the accumulated
/// denominator.
fn convolve_pixel(
    sampler: Sampler<'_>,
    kernel: &Kernel,
    full_mass: Option<f64>,
    x: u32,
    y: u32,
) -> [u8; 3] {
    let r = i64::from(kernel.radius());
    let (cx, cy) = (i64::from(x), i64::from(y));
    let mut weights = kernel.weights().iter();

    let mut sums = [0.0_f64; 3];
    let mut denom = 0.0_f64;

    for dy in -r..=r {
        for dx in -r..=r {
            let Some(&weight) = weights.next() else {
                break;
            };
            if let Some(rgb) = sampler.sample(cx + dx, cy + dy) {
                for (sum, channel) in sums.iter_mut().zip(rgb) {
                    *sum += weight * f64::from(channel);
                }
                denom += weight;
            }
        }
    }

    let denom = full_mass.unwrap_or(denom);
    sums.map(|sum| to_channel(sum, denom))
}

/// Normalize a weighted sum into an 8-bit channel value.
///
/// Rounds to nearest, not toward zero: a uniform channel must come back
/// unchanged even when the weighted sum lands a hair below the exact
/// value. See `uniform_image_stays_uniform`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(sum: f64, denom: f64) -> u8 {
    if denom == 0.0 {
        return 0;
    }
    (sum / denom).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::*;

    static RUNNING: AtomicBool = AtomicBool::new(false);

    /// Deterministic, irregular test pattern.
    fn noisy_image(width: u32, height: u32, seed: u32) -> Raster {
        Raster::from_fn(width, height, |x, y| {
            let h = |c: u32| {
                let v = x
                    .wrapping_mul(73_856_093)
                    ^ y.wrapping_mul(19_349_663)
                    ^ seed.wrapping_mul(83_492_791)
                    ^ c.wrapping_mul(2_654_435_761);
                (v % 256) as u8
            };
            image::Rgb([h(0), h(1), h(2)])
        })
    }

    fn config(worker_count: usize, boundary: BoundaryPolicy) -> BlurConfig {
        BlurConfig {
            worker_count,
            boundary,
            ..BlurConfig::default()
        }
    }

    /// Single-threaded reference used to check the pooled result.
    fn sequential(sampler: Sampler<'_>, kernel: &Kernel) -> Raster {
        let (w, h) = sampler.dimensions();
        let full_mass = sampler.always_in_bounds().then(|| kernel.sum());
        Raster::from_fn(w, h, |x, y| {
            image::Rgb(convolve_pixel(sampler, kernel, full_mass, x, y))
        })
    }

    #[test]
    fn zero_radius_is_identity() {
        let image = noisy_image(13, 7, 1);
        let kernel = Kernel::gaussian(0, 1.0).unwrap();
        for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
            let blurred = blur(&image, &kernel, &config(4, boundary), &RUNNING).unwrap();
            assert_eq!(blurred, image, "{boundary:?} should be the identity");
        }
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let image = Raster::from_fn(9, 6, |_, _| image::Rgb([200, 17, 96]));
        for radius in [1, 3, 8] {
            for sigma in [0.5, 1.0, 4.0] {
                let kernel = Kernel::gaussian(radius, sigma).unwrap();
                for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
                    let blurred = blur(&image, &kernel, &config(5, boundary), &RUNNING).unwrap();
                    for (x, y, pixel) in blurred.enumerate_pixels() {
                        assert_eq!(
                            pixel.0,
                            [200, 17, 96],
                            "{boundary:?} r={radius} s={sigma} changed ({x},{y})",
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn output_stays_within_input_range() {
        for seed in 0..6 {
            let image = noisy_image(11, 9, seed);
            let (lo, hi) = image
                .pixels()
                .flat_map(|p| p.0)
                .fold((u8::MAX, u8::MIN), |(lo, hi), c| (lo.min(c), hi.max(c)));
            for radius in 0..=5 {
                let kernel = Kernel::gaussian(radius, 1.3).unwrap();
                for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
                    let blurred = blur(&image, &kernel, &config(8, boundary), &RUNNING).unwrap();
                    for c in blurred.pixels().flat_map(|p| p.0) {
                        assert!(
                            (lo..=hi).contains(&c),
                            "channel {c} outside input range {lo}..={hi}",
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn pooled_result_matches_sequential_reference() {
        let image = noisy_image(17, 12, 9);
        let kernel = Kernel::gaussian(3, 1.2).unwrap();

        let expected = sequential(Sampler::Clamped(&image), &kernel);
        let pooled = convolve(Sampler::Clamped(&image), &kernel, 6, &RUNNING).unwrap();
        assert_eq!(pooled, expected);

        let bordered = BorderedRaster::mirrored(&image, kernel.radius());
        let expected = sequential(Sampler::Mirrored(&bordered), &kernel);
        let pooled = convolve(Sampler::Mirrored(&bordered), &kernel, 6, &RUNNING).unwrap();
        assert_eq!(pooled, expected);
    }

    #[test]
    fn result_does_not_depend_on_worker_count() {
        let image = noisy_image(20, 15, 4);
        let kernel = Kernel::gaussian(2, 0.9).unwrap();
        let reference =
            blur(&image, &kernel, &config(1, BoundaryPolicy::Clamp), &RUNNING).unwrap();
        for workers in [0, 2, 7, 100, 1000] {
            let blurred =
                blur(&image, &kernel, &config(workers, BoundaryPolicy::Clamp), &RUNNING).unwrap();
            assert_eq!(blurred, reference, "mismatch with {workers} workers");
        }
    }

    #[test]
    fn fewer_pixels_than_workers_completes() {
        let image = noisy_image(2, 2, 3);
        let kernel = Kernel::gaussian(1, 1.0).unwrap();
        let blurred =
            blur(&image, &kernel, &config(100, BoundaryPolicy::Clamp), &RUNNING).unwrap();
        assert_eq!(blurred.dimensions(), (2, 2));
    }

    #[test]
    fn radius_larger_than_image_is_defined() {
        let image = Raster::from_fn(1, 1, |_, _| image::Rgb([10, 20, 30]));
        let kernel = Kernel::gaussian(9, 3.0).unwrap();
        for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
            let blurred = blur(&image, &kernel, &config(3, boundary), &RUNNING).unwrap();
            assert_eq!(blurred.get_pixel(0, 0).0, [10, 20, 30]);
        }
    }

    #[test]
    fn empty_image_produces_empty_output() {
        let image = Raster::new(0, 4);
        let kernel = Kernel::gaussian(2, 1.0).unwrap();
        for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
            let blurred = blur(&image, &kernel, &config(3, boundary), &RUNNING).unwrap();
            assert_eq!(blurred.dimensions(), (0, 4));
        }
    }

    #[test]
    fn blur_smooths_sharp_edge() {
        let image = Raster::from_fn(10, 10, |x, _| {
            if x < 5 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let kernel = Kernel::gaussian(2, 1.5).unwrap();
        let blurred =
            blur(&image, &kernel, &config(4, BoundaryPolicy::Clamp), &RUNNING).unwrap();
        let left = blurred.get_pixel(4, 5).0[0];
        let right = blurred.get_pixel(5, 5).0[0];
        assert!(left > 0, "expected left of edge above 0, got {left}");
        assert!(right < 255, "expected right of edge below 255, got {right}");
    }

    #[test]
    fn policies_agree_in_interior_and_differ_at_edges() {
        // Horizontal ramp: clamping renormalizes toward the interior,
        // mirroring reflects the edge value back.
        let image = Raster::from_fn(12, 12, |x, _| image::Rgb([(x * 20) as u8, 0, 0]));
        let kernel = Kernel::gaussian(2, 1.0).unwrap();
        let clamped =
            blur(&image, &kernel, &config(4, BoundaryPolicy::Clamp), &RUNNING).unwrap();
        let mirrored =
            blur(&image, &kernel, &config(4, BoundaryPolicy::Mirror), &RUNNING).unwrap();

        assert_eq!(clamped.get_pixel(6, 6), mirrored.get_pixel(6, 6));
        assert_ne!(clamped.get_pixel(0, 6), mirrored.get_pixel(0, 6));
    }

    #[test]
    fn zero_denominator_yields_zero() {
        assert_eq!(to_channel(123.0, 0.0), 0);
    }

    #[test]
    fn channel_rounds_to_nearest() {
        assert_eq!(to_channel(10.4, 1.0), 10);
        assert_eq!(to_channel(10.6, 1.0), 11);
        assert_eq!(to_channel(300.0, 1.0), 255);
        // 255 * 1.1 / 1.1 lands just under 255 in floating point.
        assert!(255.0 * 1.1 / 1.1 < 255.0);
        assert_eq!(to_channel(255.0 * 1.1, 1.1), 255);
        assert_eq!(to_channel(96.0 * 0.7, 0.7), 96);
    }

    #[test]
    fn cancelled_before_start_computes_nothing() {
        let image = noisy_image(8, 8, 2);
        let kernel = Kernel::gaussian(2, 1.0).unwrap();
        let cancel = AtomicBool::new(true);
        for boundary in [BoundaryPolicy::Clamp, BoundaryPolicy::Mirror] {
            let result = blur(&image, &kernel, &config(4, boundary), &cancel);
            assert!(matches!(result, Err(PipelineError::Cancelled)), "{boundary:?}");
        }
    }

    #[test]
    fn cancelling_mid_convolution_returns_promptly() {
        // Large enough that finishing would take far longer than the
        // bound below, even in an optimized build.
        let image = noisy_image(400, 400, 5);
        let kernel = Kernel::gaussian(60, 20.0).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));

        let trigger = {
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                cancel.store(true, Ordering::Relaxed);
                Instant::now()
            })
        };
        let result = blur(&image, &kernel, &config(4, BoundaryPolicy::Clamp), &cancel);
        let returned = Instant::now();
        let cancelled_at = trigger.join().unwrap();

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(
            returned.duration_since(cancelled_at) < Duration::from_secs(2),
            "pool kept running for {:?} after cancellation",
            returned.duration_since(cancelled_at),
        );
    }
}
