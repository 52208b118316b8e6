//! Every built-in algorithm against the same synthetic scenes

use image::{Rgb, RgbImage};
use tessera_core::{ParamValue, Parameters};
use tessera_vision::{render_label_map, AlgorithmRegistry};

/// Four flat quadrants.
fn quadrants(size: u32) -> RgbImage {
    let half = size / 2;
    RgbImage::from_fn(size, size, |x, y| match (x < half, y < half) {
        (true, true) => Rgb([200, 30, 30]),
        (false, true) => Rgb([30, 200, 30]),
        (true, false) => Rgb([30, 30, 200]),
        (false, false) => Rgb([220, 220, 220]),
    })
}

#[test]
fn test_builtins_label_every_pixel() {
    let registry = AlgorithmRegistry::with_builtins();
    let image = quadrants(32);

    for algorithm in registry.list() {
        let (labels, metrics) = algorithm
            .segment(&image, &Parameters::new())
            .unwrap_or_else(|e| panic!("{} failed: {}", algorithm.name(), e));
        assert_eq!((labels.width(), labels.height()), (32, 32), "{}", algorithm.name());
        assert!(metrics.segments_count >= 1, "{}", algorithm.name());
        assert_eq!(metrics.segments_count, labels.unique_labels().len());
        assert_eq!(metrics.parameters_used, algorithm.default_parameters());

        let rendered = render_label_map(&labels);
        assert_eq!(rendered.dimensions(), image.dimensions());
    }
}

#[test]
fn test_builtins_are_deterministic() {
    let registry = AlgorithmRegistry::with_builtins();
    let image = quadrants(24);
    for algorithm in registry.list() {
        let (first, _) = algorithm.segment(&image, &Parameters::new()).unwrap();
        let (second, _) = algorithm.segment(&image, &Parameters::new()).unwrap();
        assert_eq!(first, second, "{}", algorithm.name());
    }
}

#[test]
fn test_felzenszwalb_separates_flat_regions() {
    let registry = AlgorithmRegistry::with_builtins();
    let felzenszwalb = registry.get("felzenszwalb").unwrap();
    let params = Parameters::from([
        ("sigma".to_string(), ParamValue::Float(0.1)),
        ("min_size".to_string(), ParamValue::Int(10)),
    ]);
    let (labels, _) = felzenszwalb.segment(&quadrants(32), &params).unwrap();
    assert_eq!(labels.segments_count(), 4);
    assert_ne!(labels.get(0, 0), labels.get(31, 31));
}

#[test]
fn test_supplied_values_override_defaults_and_unknown_keys_are_ignored() {
    let registry = AlgorithmRegistry::with_builtins();
    let slic = registry.get("slic").unwrap();
    let params = Parameters::from([
        ("n_segments".to_string(), ParamValue::Text("60".to_string())),
        ("bogus".to_string(), ParamValue::Int(1)),
    ]);
    let (_, metrics) = slic.segment(&quadrants(16), &params).unwrap();
    assert_eq!(
        metrics.parameters_used["n_segments"],
        ParamValue::Text("60".to_string())
    );
    assert!(!metrics.parameters_used.contains_key("bogus"));
}

#[test]
fn test_empty_image_is_rejected() {
    let registry = AlgorithmRegistry::with_builtins();
    let empty = RgbImage::new(0, 0);
    for algorithm in registry.list() {
        assert!(algorithm.segment(&empty, &Parameters::new()).is_err());
    }
}

#[test]
fn test_values_outside_declared_ranges_are_rejected() {
    let registry = AlgorithmRegistry::with_builtins();
    let image = quadrants(8);
    for algorithm in registry.list() {
        for key in algorithm.parameter_ranges().keys() {
            for extreme in [1e30, -1e30] {
                let params = Parameters::from([(key.clone(), ParamValue::Float(extreme))]);
                let err = algorithm
                    .segment(&image, &params)
                    .expect_err("extreme value accepted");
                assert!(
                    err.to_string().contains(key.as_str()),
                    "{} {}: {}",
                    algorithm.name(),
                    key,
                    err
                );
            }
        }
    }
}

#[test]
fn test_kernel_sizes_are_bounded_by_the_image() {
    let registry = AlgorithmRegistry::with_builtins();
    let image = quadrants(6);
    let cases = [
        ("felzenszwalb", "sigma"),
        ("slic", "sigma"),
        ("quickshift", "kernel_size"),
    ];
    for (name, key) in cases {
        let algorithm = registry.get(name).unwrap();
        let params = algorithm.resolve_parameters(&Parameters::from([(
            key.to_string(),
            ParamValue::Float(1e12),
        )]));
        let labels = algorithm
            .compute_labels(&image, &params)
            .unwrap_or_else(|e| panic!("{} failed: {}", name, e));
        assert_eq!((labels.width(), labels.height()), (6, 6), "{}", name);
    }
}
