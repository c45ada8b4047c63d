use criterion::{black_box, criterion_group, criterion_main, Criterion};
use histeq::host::HostDevice;
use histeq::{scan, EqualizationPipeline, PixelBuffer};
use imageproc::contrast::equalize_histogram;

fn test_image(width: u32, height: u32) -> image::GrayImage {
    image::GrayImage::from_fn(width, height, |x, y| image::Luma([((x * 3 + y * 7) % 160 + 40) as u8]))
}

fn bench_host_pipeline(c: &mut Criterion) {
    let device = HostDevice::new(None).unwrap();
    let pipeline = EqualizationPipeline::new(&device);
    let input = PixelBuffer::from(test_image(1920, 1080));

    c.bench_function("host_pipeline_1920x1080", |b| {
        b.iter(|| {
            let _result = pipeline.run(black_box(&input)).unwrap();
        })
    });
}

fn bench_serial_reference(c: &mut Criterion) {
    let input = test_image(1920, 1080).into_raw();

    c.bench_function("serial_reference_1920x1080", |b| {
        b.iter(|| {
            let histogram = scan::histogram(black_box(&input));
            let lut = scan::lut(&scan::inclusive_prefix_sum(&histogram));
            black_box(scan::re_project(&input, &lut));
        })
    });
}

fn bench_imageproc_equalize(c: &mut Criterion) {
    let input = test_image(1920, 1080);

    c.bench_function("imageproc_equalize_1920x1080", |b| {
        b.iter(|| {
            let _result = equalize_histogram(black_box(&input));
        })
    });
}

criterion_group!(benches, bench_host_pipeline, bench_serial_reference, bench_imageproc_equalize);
criterion_main!(benches);
