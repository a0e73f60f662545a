//! Tests for color boundaries and render options.

use renderer::{Color, ColorBoundaries, ColorBoundary, ColorStop, RenderMode, RenderOptions, StyleError};

// ============================================================================
// Helper functions
// ============================================================================

fn stop(value: f64, color: &str) -> ColorStop {
    ColorStop {
        value,
        color: color.to_string(),
    }
}

/// Two-color scale: black at 0, white at 100.
fn grey_scale() -> ColorBoundaries {
    ColorBoundaries::from_stops(&[stop(0.0, "#000000"), stop(100.0, "#FFFFFF")]).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_from_stops_parses_colors() {
    let boundaries = ColorBoundaries::from_stops(&[
        stop(0.0, "#00E400"),
        stop(50.0, "#FFFF00"),
        stop(100.0, "#FF7E0080"),
    ])
    .unwrap();

    assert_eq!(boundaries.boundaries().len(), 3);
    assert_eq!(boundaries.boundaries()[2].color, Color::new(0xFF, 0x7E, 0x00, 0x80));
}

#[test]
fn test_empty_boundaries_rejected() {
    assert_eq!(ColorBoundaries::new(Vec::new()), Err(StyleError::Empty));
}

#[test]
fn test_non_increasing_boundaries_rejected() {
    let result = ColorBoundaries::from_stops(&[
        stop(0.0, "#000000"),
        stop(50.0, "#111111"),
        stop(50.0, "#222222"),
    ]);
    assert_eq!(
        result,
        Err(StyleError::NotIncreasing {
            index: 2,
            value: 50.0
        })
    );
}

#[test]
fn test_non_finite_boundary_rejected() {
    let result = ColorBoundaries::new(vec![ColorBoundary {
        value: f64::INFINITY,
        color: Color::opaque(0, 0, 0),
    }]);
    assert!(matches!(result, Err(StyleError::NonFinite { index: 0, .. })));
}

#[test]
fn test_invalid_color_rejected() {
    let result = ColorBoundaries::from_stops(&[stop(0.0, "green")]);
    assert_eq!(result, Err(StyleError::InvalidColor("green".to_string())));
}

#[test]
fn test_default_stops_round_trip() {
    let default = ColorBoundaries::aqi_default();
    let stops = default.to_stops();
    assert_eq!(stops[0].color, "#00E400");
    assert_eq!(stops[5].value, 300.0);
    assert_eq!(stops[6].value, 500.0);
    assert_eq!(stops[6].color, "#4C0015");
    assert_eq!(ColorBoundaries::from_stops(&stops).unwrap(), default);
}

// ============================================================================
// Discrete coloring
// ============================================================================

#[test]
fn test_discrete_uses_interval_color() {
    let aqi = ColorBoundaries::aqi_default();
    assert_eq!(aqi.color_for(25.0, RenderMode::Discrete), Color::opaque(0x00, 0xE4, 0x00));
    assert_eq!(aqi.color_for(50.0, RenderMode::Discrete), Color::opaque(0xFF, 0xFF, 0x00));
    assert_eq!(aqi.color_for(99.9, RenderMode::Discrete), Color::opaque(0xFF, 0xFF, 0x00));
    assert_eq!(aqi.color_for(175.0, RenderMode::Discrete), Color::opaque(0xFF, 0x00, 0x00));
}

#[test]
fn test_values_clamp_to_end_colors() {
    let aqi = ColorBoundaries::aqi_default();
    assert_eq!(aqi.color_for(-20.0, RenderMode::Discrete), Color::opaque(0x00, 0xE4, 0x00));
    assert_eq!(aqi.color_for(-20.0, RenderMode::Smooth), Color::opaque(0x00, 0xE4, 0x00));
    assert_eq!(aqi.color_for(1000.0, RenderMode::Discrete), Color::opaque(0x4C, 0x00, 0x15));
    assert_eq!(aqi.color_for(1000.0, RenderMode::Smooth), Color::opaque(0x4C, 0x00, 0x15));
}

#[test]
fn test_hazardous_band_ends_at_500() {
    let aqi = ColorBoundaries::aqi_default();
    let maroon = Color::opaque(0x7E, 0x00, 0x23);
    let top = Color::opaque(0x4C, 0x00, 0x15);
    assert_eq!(aqi.color_for(300.0, RenderMode::Discrete), maroon);
    assert_eq!(aqi.color_for(499.9, RenderMode::Discrete), maroon);
    assert_eq!(aqi.color_for(500.0, RenderMode::Discrete), top);
    assert_eq!(aqi.color_for(500.0, RenderMode::Smooth), top);
}

#[test]
fn test_nan_is_transparent() {
    let aqi = ColorBoundaries::aqi_default();
    assert_eq!(aqi.color_for(f64::NAN, RenderMode::Discrete).a, 0);
    assert_eq!(aqi.color_for(f64::NAN, RenderMode::Smooth).a, 0);
}

// ============================================================================
// Smooth coloring
// ============================================================================

#[test]
fn test_smooth_blends_between_boundaries() {
    let grey = grey_scale();
    assert_eq!(grey.color_for(0.0, RenderMode::Smooth), Color::opaque(0, 0, 0));
    assert_eq!(grey.color_for(50.0, RenderMode::Smooth), Color::opaque(128, 128, 128));
    assert_eq!(grey.color_for(25.0, RenderMode::Smooth), Color::opaque(64, 64, 64));
    assert_eq!(grey.color_for(100.0, RenderMode::Smooth), Color::opaque(255, 255, 255));
}

#[test]
fn test_discrete_does_not_blend() {
    let grey = grey_scale();
    assert_eq!(grey.color_for(99.0, RenderMode::Discrete), Color::opaque(0, 0, 0));
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_opacity_must_be_unit_interval() {
    let bad = RenderOptions {
        mode: RenderMode::Discrete,
        opacity: 1.5,
    };
    assert_eq!(bad.validate(), Err(StyleError::InvalidOpacity(1.5)));
    assert!(RenderOptions::default().validate().is_ok());
}

#[test]
fn test_options_deserialize_with_defaults() {
    let options: RenderOptions = serde_json::from_str(r#"{"mode": "smooth"}"#).unwrap();
    assert_eq!(options.mode, RenderMode::Smooth);
    assert_eq!(options.opacity, 1.0);
}
