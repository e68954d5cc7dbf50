//! Terminal rendering of information curves.
//!
//! Fixed character grid, so the output is stable enough for snapshot tests.
//! θ runs left to right over the curve's grid; information runs bottom (0)
//! to top (the test maximum, plus 5% headroom).
//!
//! Glyphs: `-` test information, `.` item information (only on blank cells),
//! `^` the test information peak.

use crate::domain::{InformationCurve, TestInformation};

const HEADROOM: f64 = 0.05;

/// Render the test information curve, optionally with every item curve.
pub fn render_information_plot(
    info: &TestInformation,
    width: usize,
    height: usize,
    show_items: bool,
) -> String {
    let thetas = info.test.thetas();
    let (Some(&first), Some(&last)) = (thetas.first(), thetas.last()) else {
        return "Test information: nothing to plot\n".to_string();
    };
    if !(first.is_finite() && last.is_finite() && last > first) {
        return "Test information: nothing to plot\n".to_string();
    }

    let max_info = info.test.values().into_iter().fold(0.0, f64::max);
    let mut canvas = Canvas::new(width.max(10), height.max(5), (first, last), max_info);
    canvas.trace(&info.test, '-');
    if show_items {
        for item in &info.items {
            canvas.trace(&item.curve, '.');
        }
    }
    if let Some(peak) = info.test.peak() {
        canvas.mark(peak.theta, peak.information, '^');
    }

    let mut out = format!("Test information: theta=[{first:.2}, {last:.2}] | max={max_info:.3}\n");
    for row in &canvas.cells {
        out.extend(row.iter());
        out.push('\n');
    }
    out
}

struct Canvas {
    cells: Vec<Vec<char>>,
    theta: (f64, f64),
    info: (f64, f64),
}

impl Canvas {
    fn new(width: usize, height: usize, theta: (f64, f64), max_info: f64) -> Self {
        let pad = (max_info.max(1e-12) * HEADROOM).max(1e-12);
        Self {
            cells: vec![vec![' '; width]; height],
            theta,
            info: (-pad, max_info.max(1e-12) + pad),
        }
    }

    /// Grid cell `(column, row)` of a point; row 0 is the top.
    fn cell(&self, theta: f64, information: f64) -> (usize, usize) {
        let cols = self.cells[0].len() as f64 - 1.0;
        let rows = self.cells.len() as f64 - 1.0;
        let u = ((theta - self.theta.0) / (self.theta.1 - self.theta.0)).clamp(0.0, 1.0);
        let v = ((information - self.info.0) / (self.info.1 - self.info.0)).clamp(0.0, 1.0);
        ((u * cols).round() as usize, (rows - v * rows).round() as usize)
    }

    fn trace(&mut self, curve: &InformationCurve, ch: char) {
        let mut prev: Option<(usize, usize)> = None;
        for p in &curve.points {
            let here = self.cell(p.theta, p.information);
            let from = prev.unwrap_or(here);
            draw_line(&mut self.cells, from.0, from.1, here.0, here.1, ch);
            prev = Some(here);
        }
    }

    fn mark(&mut self, theta: f64, information: f64, ch: char) {
        let (x, y) = self.cell(theta, information);
        self.cells[y][x] = ch;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InformationPoint, ItemInformation};

    fn curve(values: &[(f64, f64)]) -> InformationCurve {
        InformationCurve {
            points: values
                .iter()
                .map(|&(theta, information)| InformationPoint {
                    theta,
                    information,
                    standard_error: None,
                })
                .collect(),
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let info = TestInformation {
            test: curve(&[(-1.0, 0.0), (0.0, 1.0), (1.0, 0.0)]),
            items: vec![],
            reliability: None,
            peak_theta: Some(0.0),
        };

        let txt = render_information_plot(&info, 11, 5, false);
        let expected = concat!(
            "Test information: theta=[-1.00, 1.00] | max=1.000\n",
            "     ^     \n",
            "    - -    \n",
            "  --   --  \n",
            " -       - \n",
            "-         -\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn item_curves_fill_only_empty_cells() {
        let info = TestInformation {
            test: curve(&[(-1.0, 0.0), (0.0, 1.0), (1.0, 0.0)]),
            items: vec![ItemInformation {
                item_id: "q1".to_string(),
                curve: curve(&[(-1.0, 0.0), (0.0, 0.5), (1.0, 0.0)]),
            }],
            reliability: None,
            peak_theta: Some(0.0),
        };
        let txt = render_information_plot(&info, 11, 5, true);
        assert!(txt.contains('.'));
        assert_eq!(txt.matches('^').count(), 1);
        // Bottom corners belong to the test curve.
        assert!(txt.lines().last().unwrap().starts_with('-'));
    }
}
