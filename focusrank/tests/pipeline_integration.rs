use anyhow::Result;
use focusrank::config::parse_class_filter;
use focusrank::detector::Detector;
use focusrank::focus_measure::Method;
use focusrank::naming::{parse_name, NamingMode, NamingPolicy, ParsedName};
use focusrank::pipeline::{Pipeline, PipelineOptions};
use focusrank::region::Detection;
use focusrank::region_scorer::Aggregation;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Reports a "car" covering the frame, but only when the image has any detail
struct DetailDetector;

impl Detector for DetailDetector {
    fn name(&self) -> &str {
        "detail"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let rgb = image.to_rgb8();
        let first = rgb.get_pixel(0, 0);
        if rgb.pixels().all(|p| p == first) {
            return Ok(Vec::new());
        }
        Ok(vec![Detection {
            x1: 0.0,
            y1: 0.0,
            x2: image.width() as f32,
            y2: image.height() as f32,
            confidence: 0.9,
            class_id: 2,
            class_name: "car".to_string(),
        }])
    }
}

/// Like `DetailDetector`, but errors on images of one exact width
struct FlakyDetector {
    failing_width: u32,
}

impl Detector for FlakyDetector {
    fn name(&self) -> &str {
        "flaky"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        if image.width() == self.failing_width {
            anyhow::bail!("Inference failed");
        }
        DetailDetector.detect(image)
    }
}

/// A "car" on the left half and a "person" on the right half
struct SplitDetector;

impl Detector for SplitDetector {
    fn name(&self) -> &str {
        "split"
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let half = image.width() as f32 / 2.0;
        let height = image.height() as f32;
        Ok(vec![
            Detection {
                x1: 0.0,
                y1: 0.0,
                x2: half,
                y2: height,
                confidence: 0.8,
                class_id: 2,
                class_name: "car".to_string(),
            },
            Detection {
                x1: half,
                y1: 0.0,
                x2: image.width() as f32,
                y2: height,
                confidence: 0.8,
                class_id: 0,
                class_name: "person".to_string(),
            },
        ])
    }
}

fn detail_image(contrast: u8) -> RgbImage {
    RgbImage::from_fn(48, 48, |x, y| {
        if (x + y / 2) % 2 == 0 {
            Rgb([60 + contrast, 60 + contrast, 60 + contrast])
        } else {
            Rgb([60, 60, 60])
        }
    })
}

fn write(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_sharpest_image_ranks_first() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(temp_dir.path(), "a.png", &detail_image(0));
    let b = write(temp_dir.path(), "b.png", &detail_image(25));
    let c = write(temp_dir.path(), "c.png", &detail_image(150));
    let output_dir = temp_dir.path().join("ranked");

    let options = PipelineOptions {
        methods: vec![Method::Laplacian],
        ..PipelineOptions::new(&output_dir)
    };
    let result = Pipeline::new(DetailDetector, options)
        .run(&[a.clone(), b, c])
        .unwrap();

    assert!(!result.has_failures());
    assert_eq!(result.images_scored, 3);
    assert_eq!(result.detections_found, 2);
    assert_eq!(result.diagnostics.no_region, vec![a]);
    assert_eq!(
        file_names(&output_dir),
        vec![
            "laplacian__001__c.png",
            "laplacian__002__b.png",
            "laplacian__003__a.png",
        ]
    );

    // Copy leaves the sources in place
    assert!(temp_dir.path().join("c.png").exists());
}

#[test]
fn test_detector_failure_skips_only_that_image() {
    let temp_dir = TempDir::new().unwrap();
    let a = write(temp_dir.path(), "a.png", &detail_image(30));
    let broken = write(
        temp_dir.path(),
        "broken.png",
        &RgbImage::from_pixel(20, 20, Rgb([9, 9, 9])),
    );
    let c = write(temp_dir.path(), "c.png", &detail_image(160));
    let output_dir = temp_dir.path().join("ranked");

    let options = PipelineOptions {
        methods: vec![Method::Laplacian, Method::Tenengrad],
        ..PipelineOptions::new(&output_dir)
    };
    let result = Pipeline::new(FlakyDetector { failing_width: 20 }, options)
        .run(&[a.clone(), broken.clone(), c.clone()])
        .unwrap();

    assert!(!result.has_failures());
    assert_eq!(result.images_discovered, 3);
    assert_eq!(result.images_scored, 2);
    assert_eq!(result.diagnostics.failed.len(), 1);
    assert_eq!(result.diagnostics.failed[0].path, broken);
    assert!(result.diagnostics.failed[0].error.contains("Inference failed"));

    for ranking in &result.rankings {
        let ranks: Vec<usize> = ranking.entries.iter().map(|e| e.rank).collect();
        let sources: Vec<&PathBuf> = ranking.entries.iter().map(|e| &e.source).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(sources, vec![&c, &a]);
    }
    assert_eq!(
        file_names(&output_dir),
        vec![
            "laplacian__001__c.png",
            "laplacian__002__a.png",
            "tenengrad__001__c.png",
            "tenengrad__002__a.png",
        ]
    );
}

#[test]
fn test_every_method_gets_its_own_ranking() {
    let temp_dir = TempDir::new().unwrap();
    let soft = write(temp_dir.path(), "soft.png", &detail_image(20));
    let sharp = write(temp_dir.path(), "sharp.png", &detail_image(180));
    let output_dir = temp_dir.path().join("ranked");

    let result = Pipeline::new(DetailDetector, PipelineOptions::new(&output_dir))
        .run(&[soft, sharp.clone()])
        .unwrap();

    assert_eq!(result.rankings.len(), Method::all().len());
    for ranking in &result.rankings {
        assert_eq!(ranking.entries[0].source, sharp, "{}", ranking.method);
        let expected = format!("{}__001__sharp.png", ranking.method.key());
        assert!(output_dir.join(expected).exists());
    }
    assert_eq!(file_names(&output_dir).len(), 2 * Method::all().len());
}

#[test]
fn test_ties_keep_discovery_order() {
    let temp_dir = TempDir::new().unwrap();
    let x = write(temp_dir.path(), "x.png", &detail_image(0));
    let y = write(temp_dir.path(), "y.png", &detail_image(0));
    let output_dir = temp_dir.path().join("ranked");

    let options = PipelineOptions {
        methods: vec![Method::Laplacian],
        ..PipelineOptions::new(&output_dir)
    };
    let result = Pipeline::new(DetailDetector, options)
        .run(&[x.clone(), y.clone()])
        .unwrap();

    let entries = &result.rankings[0].entries;
    assert_eq!(entries[0].score, 0.0);
    assert_eq!(entries[1].score, 0.0);
    assert_eq!(entries[0].source, x);
    assert_eq!(entries[1].source, y);
    assert!(output_dir.join("laplacian__001__x.png").exists());
    assert!(output_dir.join("laplacian__002__y.png").exists());
}

#[test]
fn test_score_naming_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(temp_dir.path(), "bus.png", &detail_image(90));
    let output_dir = temp_dir.path().join("ranked");

    let options = PipelineOptions {
        methods: vec![Method::Brenner],
        naming: NamingPolicy {
            mode: NamingMode::Score,
            pad_width: 6,
        },
        ..PipelineOptions::new(&output_dir)
    };
    let result = Pipeline::new(DetailDetector, options).run(&[path]).unwrap();

    let names = file_names(&output_dir);
    assert_eq!(names.len(), 1);
    match parse_name(&names[0]) {
        Some(ParsedName::Score { score, original }) => {
            assert_eq!(original, "bus.png");
            assert_eq!(score, result.plan[0].score.round() as u64);
        }
        other => panic!("Unexpected parse of {}: {other:?}", names[0]),
    }
}

#[test]
fn test_class_filter_and_aggregation() {
    let temp_dir = TempDir::new().unwrap();
    // Left half flat, right half detailed
    let img = RgbImage::from_fn(64, 32, |x, y| {
        if x >= 32 && (x + y / 2) % 2 == 0 {
            Rgb([220, 220, 220])
        } else {
            Rgb([60, 60, 60])
        }
    });
    let path = write(temp_dir.path(), "street.png", &img);

    let score_with = |classes: &str, aggregation: Aggregation| {
        let options = PipelineOptions {
            methods: vec![Method::Laplacian],
            class_filter: parse_class_filter(classes).unwrap(),
            aggregation,
            ..PipelineOptions::new(temp_dir.path().join("unused"))
        };
        let (scores, detections) = Pipeline::new(SplitDetector, options)
            .score_path(&path)
            .unwrap();
        assert_eq!(detections, 2);
        scores
    };

    let person = score_with("person", Aggregation::Max);
    let car = score_with("car", Aggregation::Max);
    let both_max = score_with("all", Aggregation::Max);
    let both_mean = score_with("car,person", Aggregation::Mean);

    assert!(person.get(Method::Laplacian) > 0.0);
    assert_eq!(car.get(Method::Laplacian), 0.0);
    assert_eq!(car.qualifying_regions, 1);
    assert_eq!(both_max.get(Method::Laplacian), person.get(Method::Laplacian));
    assert!(
        (both_mean.get(Method::Laplacian) - person.get(Method::Laplacian) / 2.0).abs() < 1e-9
    );

    let bicycle = score_with("bicycle", Aggregation::Max);
    assert!(bicycle.no_qualifying_region());
    assert_eq!(bicycle.get(Method::Laplacian), 0.0);
}
