//! Chart specification assembled by generated scripts, rendered to PNG.

use std::ops::Range;
use std::path::Path;

use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use thiserror::Error;

const DEFAULT_WIDTH: u32 = 1200;
const DEFAULT_HEIGHT: u32 = 800;

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart has no drawable data")]
    Empty,
    #[error("series '{name}' has mismatched lengths: {got} vs {want}")]
    LengthMismatch {
        name: String,
        got: usize,
        want: usize,
    },
    #[error("unknown style '{0}' (expected one of: default, light, dark)")]
    UnknownStyle(String),
    #[error("render error: {0}")]
    Render(String),
}

/// Small fixed whitelist; anything fancier is a prompt-level non-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartStyle {
    #[default]
    Default,
    Light,
    Dark,
}

impl ChartStyle {
    pub fn parse(name: &str) -> Result<Self, ChartError> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Ok(ChartStyle::Default),
            "light" => Ok(ChartStyle::Light),
            "dark" => Ok(ChartStyle::Dark),
            other => Err(ChartError::UnknownStyle(other.to_string())),
        }
    }

    fn background(&self) -> RGBColor {
        match self {
            ChartStyle::Default => RGBColor(255, 255, 255),
            ChartStyle::Light => RGBColor(245, 245, 245),
            ChartStyle::Dark => RGBColor(30, 30, 34),
        }
    }

    fn foreground(&self) -> RGBColor {
        match self {
            ChartStyle::Default | ChartStyle::Light => RGBColor(20, 20, 20),
            ChartStyle::Dark => RGBColor(222, 222, 222),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SeriesSpec {
    Bar {
        name: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Line {
        name: String,
        xs: Vec<f64>,
        ys: Vec<f64>,
    },
    Scatter {
        name: String,
        xs: Vec<f64>,
        ys: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub style: ChartStyle,
    pub series: Vec<SeriesSpec>,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            style: ChartStyle::Default,
            series: Vec::new(),
        }
    }

    pub fn add_bar(
        &mut self,
        name: impl Into<String>,
        labels: Vec<String>,
        values: Vec<f64>,
    ) -> Result<(), ChartError> {
        let name = name.into();
        if labels.len() != values.len() {
            return Err(ChartError::LengthMismatch {
                name,
                got: values.len(),
                want: labels.len(),
            });
        }
        self.series.push(SeriesSpec::Bar {
            name,
            labels,
            values,
        });
        Ok(())
    }

    pub fn add_line(
        &mut self,
        name: impl Into<String>,
        xs: Vec<f64>,
        ys: Vec<f64>,
    ) -> Result<(), ChartError> {
        let name = name.into();
        if xs.len() != ys.len() {
            return Err(ChartError::LengthMismatch {
                name,
                got: ys.len(),
                want: xs.len(),
            });
        }
        self.series.push(SeriesSpec::Line { name, xs, ys });
        Ok(())
    }

    pub fn add_scatter(
        &mut self,
        name: impl Into<String>,
        xs: Vec<f64>,
        ys: Vec<f64>,
    ) -> Result<(), ChartError> {
        let name = name.into();
        if xs.len() != ys.len() {
            return Err(ChartError::LengthMismatch {
                name,
                got: ys.len(),
                want: xs.len(),
            });
        }
        self.series.push(SeriesSpec::Scatter { name, xs, ys });
        Ok(())
    }

    /// Renders the spec as a PNG at `path`. The parent directory must exist;
    /// rendering failures surface as errors, there is no partial output.
    pub fn save(&self, path: &Path) -> Result<(), ChartError> {
        if self.series.is_empty() {
            return Err(ChartError::Empty);
        }
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&self.style.background()).map_err(draw_err)?;

        let categories = collect_categories(&self.series);
        if categories.is_empty() {
            self.render_numeric(&root)?;
        } else {
            self.render_categorical(&root, &categories)?;
        }
        root.present().map_err(draw_err)?;
        Ok(())
    }

    fn render_categorical(
        &self,
        root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
        categories: &[String],
    ) -> Result<(), ChartError> {
        let fg = self.style.foreground();
        let light = fg.mix(0.1);
        let bold = fg.mix(0.2);
        let n = categories.len();
        let y_range = self.y_range(true)?;

        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, ("sans-serif", 30).into_font().color(&fg))
            .margin(20)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), y_range)
            .map_err(draw_err)?;

        let labels = categories.to_vec();
        chart
            .configure_mesh()
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .x_labels(n)
            .label_style(("sans-serif", 16).into_font().color(&fg))
            .axis_style(&fg)
            .light_line_style(&light)
            .bold_line_style(&bold)
            .x_label_formatter(&|x: &f64| {
                let x = *x;
                let idx = x.round();
                if (x - idx).abs() < 0.25 && idx >= 0.0 && (idx as usize) < labels.len() {
                    labels[idx as usize].clone()
                } else {
                    String::new()
                }
            })
            .draw()
            .map_err(draw_err)?;

        let bar_count = self
            .series
            .iter()
            .filter(|s| matches!(s, SeriesSpec::Bar { .. }))
            .count()
            .max(1);
        let slot = 0.8 / bar_count as f64;
        let mut bar_idx = 0usize;

        for (si, series) in self.series.iter().enumerate() {
            let color = PALETTE[si % PALETTE.len()];
            match series {
                SeriesSpec::Bar {
                    name,
                    labels: bar_labels,
                    values,
                } => {
                    let rects: Vec<_> = bar_labels
                        .iter()
                        .zip(values)
                        .filter_map(|(label, v)| {
                            if !v.is_finite() {
                                return None;
                            }
                            let ci = categories.iter().position(|c| c == label)? as f64;
                            let x0 = ci - 0.4 + bar_idx as f64 * slot;
                            Some(Rectangle::new([(x0, 0.0), (x0 + slot, *v)], color.filled()))
                        })
                        .collect();
                    chart
                        .draw_series(rects)
                        .map_err(draw_err)?
                        .label(name.clone())
                        .legend(move |(x, y)| {
                            Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                        });
                    bar_idx += 1;
                }
                SeriesSpec::Line { name, xs, ys } => {
                    chart
                        .draw_series(LineSeries::new(
                            finite_points(xs, ys),
                            color.stroke_width(2),
                        ))
                        .map_err(draw_err)?
                        .label(name.clone())
                        .legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 14, y)], color.stroke_width(2))
                        });
                }
                SeriesSpec::Scatter { name, xs, ys } => {
                    chart
                        .draw_series(
                            finite_points(xs, ys)
                                .into_iter()
                                .map(|p| Circle::new(p, 4, color.filled())),
                        )
                        .map_err(draw_err)?
                        .label(name.clone())
                        .legend(move |(x, y)| Circle::new((x + 7, y), 4, color.filled()));
                }
            }
        }
        self.draw_legend(&mut chart)
    }

    fn render_numeric(
        &self,
        root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    ) -> Result<(), ChartError> {
        let fg = self.style.foreground();
        let light = fg.mix(0.1);
        let bold = fg.mix(0.2);
        let x_range = self.x_range()?;
        let y_range = self.y_range(false)?;

        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, ("sans-serif", 30).into_font().color(&fg))
            .margin(20)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)
            .map_err(draw_err)?;

        chart
            .configure_mesh()
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .label_style(("sans-serif", 16).into_font().color(&fg))
            .axis_style(&fg)
            .light_line_style(&light)
            .bold_line_style(&bold)
            .draw()
            .map_err(draw_err)?;

        for (si, series) in self.series.iter().enumerate() {
            let color = PALETTE[si % PALETTE.len()];
            match series {
                // Bars force the categorical renderer, so none can reach here.
                SeriesSpec::Bar { .. } => {}
                SeriesSpec::Line { name, xs, ys } => {
                    chart
                        .draw_series(LineSeries::new(
                            finite_points(xs, ys),
                            color.stroke_width(2),
                        ))
                        .map_err(draw_err)?
                        .label(name.clone())
                        .legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 14, y)], color.stroke_width(2))
                        });
                }
                SeriesSpec::Scatter { name, xs, ys } => {
                    chart
                        .draw_series(
                            finite_points(xs, ys)
                                .into_iter()
                                .map(|p| Circle::new(p, 4, color.filled())),
                        )
                        .map_err(draw_err)?
                        .label(name.clone())
                        .legend(move |(x, y)| Circle::new((x + 7, y), 4, color.filled()));
                }
            }
        }
        self.draw_legend(&mut chart)
    }

    fn draw_legend<'a>(
        &self,
        chart: &mut ChartContext<
            'a,
            BitMapBackend<'a>,
            Cartesian2d<RangedCoordf64, RangedCoordf64>,
        >,
    ) -> Result<(), ChartError> {
        if self.series.len() < 2 {
            return Ok(());
        }
        let fg = self.style.foreground();
        let bg = self.style.background().mix(0.85);
        chart
            .configure_series_labels()
            .background_style(&bg)
            .border_style(&fg)
            .label_font(("sans-serif", 16).into_font().color(&fg))
            .draw()
            .map_err(draw_err)?;
        Ok(())
    }

    fn y_range(&self, include_zero: bool) -> Result<Range<f64>, ChartError> {
        let mut values: Vec<f64> = Vec::new();
        for series in &self.series {
            let ys = match series {
                SeriesSpec::Bar { values, .. } => values,
                SeriesSpec::Line { ys, .. } | SeriesSpec::Scatter { ys, .. } => ys,
            };
            values.extend(ys.iter().copied().filter(|v| v.is_finite()));
        }
        if include_zero {
            values.push(0.0);
        }
        padded_range(&values)
    }

    fn x_range(&self) -> Result<Range<f64>, ChartError> {
        let mut values: Vec<f64> = Vec::new();
        for series in &self.series {
            if let SeriesSpec::Line { xs, .. } | SeriesSpec::Scatter { xs, .. } = series {
                values.extend(xs.iter().copied().filter(|v| v.is_finite()));
            }
        }
        padded_range(&values)
    }
}

fn padded_range(values: &[f64]) -> Result<Range<f64>, ChartError> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return Err(ChartError::Empty);
    }
    let span = max - min;
    if span < f64::EPSILON {
        return Ok(min - 1.0..max + 1.0);
    }
    Ok(min - span * 0.05..max + span * 0.05)
}

fn finite_points(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect()
}

/// Ordered union of bar labels across all bar series; empty when the chart
/// has no bar series, which selects the numeric renderer.
fn collect_categories(series: &[SeriesSpec]) -> Vec<String> {
    let mut categories = Vec::new();
    for s in series {
        if let SeriesSpec::Bar { labels, .. } = s {
            for label in labels {
                if !categories.contains(label) {
                    categories.push(label.clone());
                }
            }
        }
    }
    categories
}

fn draw_err<E: std::fmt::Display>(e: E) -> ChartError {
    ChartError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_grouped_bars_to_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bars.png");
        let mut spec = ChartSpec::new("Quarterly sales");
        spec.x_label = "Quarter".to_string();
        spec.y_label = "Sales".to_string();
        spec.add_bar(
            "2024",
            vec!["Q1".into(), "Q2".into()],
            vec![10.0, 20.0],
        )
        .expect("bar");
        spec.add_bar(
            "2025",
            vec!["Q1".into(), "Q2".into()],
            vec![15.0, 25.0],
        )
        .expect("bar");
        spec.save(&path).expect("save");
        let meta = std::fs::metadata(&path).expect("file written");
        assert!(meta.len() > 0);
    }

    #[test]
    fn renders_line_and_scatter_to_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lines.png");
        let mut spec = ChartSpec::new("Trend");
        spec.style = ChartStyle::Dark;
        spec.add_line("trend", vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 8.0])
            .expect("line");
        spec.add_scatter("points", vec![1.0, 2.0, 3.0], vec![2.5, 3.5, 7.0])
            .expect("scatter");
        spec.save(&path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn empty_chart_refuses_to_render() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = ChartSpec::new("nothing");
        let err = spec.save(&dir.path().join("none.png")).expect_err("empty");
        assert!(matches!(err, ChartError::Empty));
    }

    #[test]
    fn mismatched_series_lengths_rejected() {
        let mut spec = ChartSpec::new("bad");
        let err = spec
            .add_bar("s", vec!["a".into()], vec![1.0, 2.0])
            .expect_err("mismatch");
        assert!(matches!(err, ChartError::LengthMismatch { .. }));
    }

    #[test]
    fn style_whitelist_is_enforced() {
        assert_eq!(ChartStyle::parse("DARK").expect("dark"), ChartStyle::Dark);
        assert!(matches!(
            ChartStyle::parse("seaborn"),
            Err(ChartError::UnknownStyle(_))
        ));
    }
}
