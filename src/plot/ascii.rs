//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - observed points: `o`
//! - fitted curve: `-` line
//!
//! The time axis always starts at the baseline visit `0`.

use crate::domain::{CurveEntry, FitResult, Observation, Series};
use crate::models::sample_prediction;

/// Render a plot for an in-memory fit result.
///
/// Unfit results plot the observations only.
pub fn render_ascii_plot(series: &Series, fit: &FitResult, width: usize, height: usize) -> String {
    let t_max = series.max_time();
    let curve = sample_prediction(fit, t_max, width.max(2));
    render_plot(series.observations(), curve.as_deref(), t_max, width, height)
}

/// Render a saved curve entry (precomputed grid plus its observations).
pub fn render_curve_entry(entry: &CurveEntry, width: usize, height: usize) -> String {
    let curve: Vec<(f64, f64)> = entry
        .grid
        .time
        .iter()
        .zip(entry.grid.measurement.iter())
        .map(|(&t, &y)| (t, y))
        .collect();
    let t_max = curve
        .iter()
        .map(|&(t, _)| t)
        .chain(entry.observations.iter().map(|o| o.time))
        .fold(0.0, f64::max);

    let mut out = format!(
        "{} [{}] MTPMemax={} K={}\n",
        entry.group,
        entry.fit.method,
        fmt_opt(entry.fit.mtpm_emax),
        fmt_opt(entry.fit.k),
    );
    out.push_str(&render_plot(&entry.observations, Some(&curve), t_max, width, height));
    out
}

fn render_plot(
    observations: &[Observation],
    curve_points: Option<&[(f64, f64)]>,
    t_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let t_min = 0.0;
    let t_max = if t_max.is_finite() && t_max > t_min { t_max } else { 1.0 };

    // Determine y-range from observed points and curve points.
    let (y_min, y_max) = y_range(observations, curve_points).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Draw curve first (so points can overlay).
    if let Some(curve) = curve_points {
        draw_curve(&mut grid, curve, t_min, t_max, y_min, y_max);
    }

    for o in observations {
        let x = map_x(o.time, t_min, t_max, width);
        let y = map_y(o.measurement, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: time=[{t_min:.3}, {t_max:.3}] | MTPM=[{y_min:.3}, {y_max:.3}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn y_range(observations: &[Observation], curve: Option<&[(f64, f64)]>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for o in observations {
        min_y = min_y.min(o.measurement);
        max_y = max_y.max(o.measurement);
    }
    if let Some(curve) = curve {
        for &(_, y) in curve {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CurveGrid, FitDiagnostics, FitMethod};

    fn exact_fit() -> FitResult {
        FitResult::fitted(
            FitMethod::PrimarySolver,
            1.0,
            1.0,
            3,
            FitDiagnostics {
                sse: 0.0,
                rse: Some(0.0),
                iterations: 1,
                se_mtpm_emax: None,
                se_k: None,
                start_mtpm_emax: 1.0,
                start_k: 1.0,
            },
            Vec::new(),
        )
    }

    fn series() -> Series {
        Series::from_columns(&[0.0, 1.0, 3.0], &[0.0, 0.5, 0.75]).unwrap()
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let txt = render_ascii_plot(&series(), &exact_fit(), 12, 5);
        let expected = concat!(
            "Plot: time=[0.000, 3.000] | MTPM=[-0.038, 0.787]\n",
            "        ---o\n",
            "    o---    \n",
            "  --        \n",
            " -          \n",
            "o           \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn unfit_result_plots_points_only() {
        let txt = render_ascii_plot(&series(), &FitResult::unfit(3, Vec::new()), 12, 5);
        let body: String = txt.lines().skip(1).collect();
        assert_eq!(body.matches('o').count(), 3);
        assert!(!txt.lines().skip(1).any(|l| l.contains('-')));
    }

    #[test]
    fn curve_entry_has_title_line() {
        let fit = exact_fit();
        let samples = sample_prediction(&fit, 3.0, 12).unwrap();
        let (time, measurement) = samples.into_iter().unzip();
        let entry = CurveEntry {
            group: "hip".to_string(),
            fit,
            observations: series().observations().to_vec(),
            grid: CurveGrid { time, measurement },
        };

        let txt = render_curve_entry(&entry, 12, 5);
        let mut lines = txt.lines();
        assert_eq!(lines.next(), Some("hip [primary] MTPMemax=1.0000 K=1.0000"));
        assert!(lines.next().is_some_and(|l| l.starts_with("Plot: time=[0.000, 3.000]")));
        assert_eq!(txt.lines().count(), 2 + 5);
    }
}
