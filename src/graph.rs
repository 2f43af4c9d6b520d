use plotters::coord::Shift;
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;
use plotters::style::FontTransform;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::error::Error as StdError;
use std::io::Cursor;

use crate::country::{Attribute, Country};
use crate::error::{Error, Result};

/// Static charts produced from the record set
///
/// Each variant has a fixed file name; the presentation layer decides where
/// the rendered PNG ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphType {
    /// Average income per country, one bar each, in storage order
    IncomeBar,

    /// Population distribution over 10 bins with a density curve
    PopulationHistogram,

    /// Pairwise correlation of the numeric attributes
    CorrelationMatrix,
}

impl GraphType {
    pub const STATIC: [GraphType; 3] = [
        GraphType::IncomeBar,
        GraphType::PopulationHistogram,
        GraphType::CorrelationMatrix,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            GraphType::IncomeBar => "income_chart.png",
            GraphType::PopulationHistogram => "population_hist.png",
            GraphType::CorrelationMatrix => "correlation_matrix.png",
        }
    }

    pub fn default_options(self) -> GraphOptions {
        match self {
            GraphType::IncomeBar => GraphOptions {
                title: "Average annual income in EU countries".to_string(),
                x_label: "name".to_string(),
                y_label: "avg_income".to_string(),
                width: 1000,
                height: 600,
            },
            GraphType::PopulationHistogram => GraphOptions {
                title: "Population distribution".to_string(),
                x_label: "population".to_string(),
                y_label: "Count".to_string(),
                width: 1000,
                height: 600,
            },
            GraphType::CorrelationMatrix => GraphOptions {
                title: "Data correlation".to_string(),
                x_label: String::new(),
                y_label: String::new(),
                width: 800,
                height: 600,
            },
        }
    }
}

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,
}

/// Number of population histogram bins
pub const HISTOGRAM_BINS: usize = 10;

/// Points sampled along the density curve
const DENSITY_SAMPLES: usize = 200;

/// One bar of the income chart
#[derive(Clone, Debug, PartialEq)]
pub struct Bar {
    pub label: String,
    /// `None` when the country has no numeric income; no bar is drawn
    pub height: Option<f64>,
}

/// Income per country in storage order
#[derive(Clone, Debug, PartialEq)]
pub struct IncomeBars {
    pub bars: Vec<Bar>,
}

impl IncomeBars {
    pub fn from_records(records: &[Country]) -> Result<IncomeBars> {
        let bars: Vec<Bar> = records
            .iter()
            .map(|c| Bar {
                label: c.name().to_string(),
                height: c.get(Attribute::AvgIncome).as_f64(),
            })
            .collect();

        if bars.iter().all(|b| b.height.is_none()) {
            return Err(Error::InsufficientData(
                "no avg_income values to chart".to_string(),
            ));
        }
        Ok(IncomeBars { bars })
    }

    fn value_range(&self) -> (f64, f64) {
        let heights = self.bars.iter().filter_map(|b| b.height);
        let (min, max) = heights.fold((0.0f64, 0.0f64), |(lo, hi), h| (lo.min(h), hi.max(h)));
        if max > min {
            (min * 1.1, max * 1.1)
        } else {
            (min, min + 1.0)
        }
    }
}

/// Population counts over equal-width bins plus a smoothed density curve
#[derive(Clone, Debug, PartialEq)]
pub struct PopulationHistogram {
    /// `HISTOGRAM_BINS + 1` ascending bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Gaussian kernel density scaled to counts; empty when it is undefined
    pub density: Vec<(f64, f64)>,
}

impl PopulationHistogram {
    pub fn from_records(records: &[Country]) -> Result<PopulationHistogram> {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|c| c.get(Attribute::Population).as_f64())
            .collect();
        if values.is_empty() {
            return Err(Error::InsufficientData(
                "no population values to chart".to_string(),
            ));
        }

        let mut min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min == max {
            min -= 0.5;
            max += 0.5;
        }
        let width = (max - min) / HISTOGRAM_BINS as f64;
        let edges: Vec<f64> = (0..=HISTOGRAM_BINS)
            .map(|i| min + width * i as f64)
            .collect();

        let mut counts = vec![0usize; HISTOGRAM_BINS];
        for v in &values {
            // The last bin is closed on the right
            let bin = (((v - min) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
            counts[bin] += 1;
        }

        let density: Vec<(f64, f64)> = match scott_bandwidth(&values) {
            Some(bandwidth) => {
                let n = values.len() as f64;
                let step = (max - min) / (DENSITY_SAMPLES - 1) as f64;
                (0..DENSITY_SAMPLES)
                    .map(|i| {
                        let x = min + step * i as f64;
                        (x, gaussian_kde(&values, bandwidth, x) * n * width)
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(PopulationHistogram {
            edges,
            counts,
            density,
        })
    }

    fn y_max(&self) -> f64 {
        let counts = self.counts.iter().copied().max().unwrap_or(0) as f64;
        let density = self.density.iter().map(|&(_, y)| y).fold(0.0, f64::max);
        counts.max(density).max(1.0) * 1.1
    }
}

/// Pearson correlation between every pair of numeric attributes
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<&'static str>,
    /// Row-major; `None` where the coefficient is undefined
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn from_records(records: &[Country]) -> Result<CorrelationMatrix> {
        if records.is_empty() {
            return Err(Error::InsufficientData(
                "no records to correlate".to_string(),
            ));
        }

        let columns: Vec<Vec<Option<f64>>> = Attribute::ALL
            .iter()
            .map(|&a| records.iter().map(|c| c.get(a).as_f64()).collect())
            .collect();

        let values: Vec<Vec<Option<f64>>> = columns
            .iter()
            .map(|xs| columns.iter().map(|ys| pearson(xs, ys)).collect::<Vec<_>>())
            .collect();

        Ok(CorrelationMatrix {
            labels: Attribute::ALL.iter().map(|a| a.column()).collect(),
            values,
        })
    }

    pub fn get(&self, row: Attribute, col: Attribute) -> Option<f64> {
        let index = |a| Attribute::ALL.iter().position(|&b| b == a);
        self.values.get(index(row)?)?.get(index(col)?).copied().flatten()
    }
}

/// Render one static chart of `records` to PNG bytes using its default options
pub fn create_graph(records: &[Country], graph_type: GraphType) -> Result<Vec<u8>> {
    let options = graph_type.default_options();
    log::debug!("rendering {:?} from {} records", graph_type, records.len());
    match graph_type {
        GraphType::IncomeBar => create_bar_graph(&IncomeBars::from_records(records)?, &options),
        GraphType::PopulationHistogram => {
            create_histogram(&PopulationHistogram::from_records(records)?, &options)
        }
        GraphType::CorrelationMatrix => {
            create_heatmap(&CorrelationMatrix::from_records(records)?, &options)
        }
    }
}

/// Creates the income bar graph
///
/// Bars keep storage order and are labeled with the country name; countries
/// without an income value leave an empty slot.
pub fn create_bar_graph(data: &IncomeBars, options: &GraphOptions) -> Result<Vec<u8>> {
    let n = data.bars.len();
    let (y_min, y_max) = data.value_range();

    render_png(options, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(120)
            .y_label_area_size(70)
            .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n)
            .x_label_formatter(&|v: &SegmentValue<usize>| match v {
                SegmentValue::CenterOf(i) => data
                    .bars
                    .get(*i)
                    .map(|b| b.label.clone())
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .x_label_style(
                ("sans-serif", 14)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.7).filled())
                .margin(3)
                .data(
                    data.bars
                        .iter()
                        .enumerate()
                        .filter_map(|(i, b)| b.height.map(|h| (i, h))),
                ),
        )?;

        Ok(())
    })
}

/// Creates the population histogram with its density overlay
pub fn create_histogram(data: &PopulationHistogram, options: &GraphOptions) -> Result<Vec<u8>> {
    let x_range = data.edges[0]..data.edges[HISTOGRAM_BINS];
    let y_max = data.y_max();

    render_png(options, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, 0f64..y_max)?;

        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .draw()?;

        let bins = || {
            data.counts
                .iter()
                .enumerate()
                .map(|(i, &c)| [(data.edges[i], 0.0), (data.edges[i + 1], c as f64)])
        };
        chart.draw_series(bins().map(|r| Rectangle::new(r, BLUE.mix(0.5).filled())))?;
        chart.draw_series(bins().map(|r| Rectangle::new(r, BLUE.stroke_width(1))))?;

        if !data.density.is_empty() {
            chart.draw_series(LineSeries::new(
                data.density.iter().copied(),
                BLUE.stroke_width(2),
            ))?;
        }

        Ok(())
    })
}

/// Creates the annotated correlation heatmap
///
/// Cells are colored on a blue-white-red scale and labeled with two
/// decimals; undefined coefficients are drawn grey and left blank.
pub fn create_heatmap(data: &CorrelationMatrix, options: &GraphOptions) -> Result<Vec<u8>> {
    let k = data.labels.len() as i32;
    let label = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| data.labels.get(i))
            .map(|s| s.to_string())
            .unwrap_or_default()
    };
    // Row 0 is drawn at the top, so its cell spans k-1..k
    let x_label = |v: &i32| label(*v);
    let y_label = |v: &i32| label(k - 1 - *v);

    render_png(options, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(110)
            .build_cartesian_2d(0i32..k, 0i32..k)?;

        let (width, height) = chart.plotting_area().dim_in_pixel();
        let cell_w = (width as i32) / k.max(1);
        let cell_h = (height as i32) / k.max(1);

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(k as usize)
            .y_labels(k as usize)
            .x_label_offset(cell_w / 2)
            .y_label_offset(-cell_h / 2)
            .x_label_formatter(&x_label)
            .y_label_formatter(&y_label)
            .draw()?;

        let cells: Vec<(i32, i32, Option<f64>)> = data
            .values
            .iter()
            .enumerate()
            .flat_map(|(row, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(move |(col, v)| (col as i32, k - 1 - row as i32, *v))
            })
            .collect();

        chart.draw_series(cells.iter().map(|&(x, y, v)| {
            Rectangle::new([(x, y), (x + 1, y + 1)], coolwarm(v).filled())
        }))?;

        let text_style = ("sans-serif", 16)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        chart.draw_series(cells.iter().filter_map(|&(x, y, v)| {
            v.map(|v| {
                EmptyElement::at((x, y + 1))
                    + Text::new(format!("{:.2}", v), (cell_w / 2, cell_h / 2), text_style.clone())
            })
        }))?;

        Ok(())
    })
}

// Draw into an RGB buffer and encode it as PNG
fn render_png<F>(options: &GraphOptions, draw: F) -> Result<Vec<u8>>
where
    F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> std::result::Result<(), Box<dyn StdError>>,
{
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; (width as usize) * (height as usize) * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        draw(&root).map_err(render_error)?;
        root.present().map_err(render_error)?;
    }

    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::Render("pixel buffer does not match image size".to_string()))?;
    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .map_err(render_error)?;
    Ok(png.into_inner())
}

pub(crate) fn render_error<E: std::fmt::Display>(err: E) -> Error {
    Error::Render(err.to_string())
}

// Blue (-1) through light grey (0) to red (+1)
fn coolwarm(value: Option<f64>) -> RGBColor {
    let Some(v) = value else {
        return RGBColor(235, 235, 235);
    };
    let lerp = |a: u8, b: u8, t: f64| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    let (from, to, t) = if v < 0.0 {
        ((59, 76, 192), (221, 221, 221), v + 1.0)
    } else {
        ((221, 221, 221), (180, 4, 38), v)
    };
    let t = t.clamp(0.0, 1.0);
    RGBColor(lerp(from.0, to.0, t), lerp(from.1, to.1, t), lerp(from.2, to.2, t))
}

/// Pearson coefficient over the rows where both values are present
fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Scott's rule bandwidth; `None` for fewer than two values or zero spread
fn scott_bandwidth(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = variance.sqrt();
    if std == 0.0 {
        return None;
    }
    Some(std * n.powf(-0.2))
}

fn gaussian_kde(values: &[f64], bandwidth: f64, x: f64) -> f64 {
    let norm = 1.0 / (bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    let sum: f64 = values
        .iter()
        .map(|v| (-0.5 * ((x - v) / bandwidth).powi(2)).exp())
        .sum();
    norm * sum / values.len() as f64
}
