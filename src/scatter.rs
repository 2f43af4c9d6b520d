//! Interactive GDP vs. income scatter.
//!
//! The chart is drawn with the plotters SVG backend and wrapped together with
//! its point data and a small inline script into one HTML fragment, so a page
//! can embed it without loading anything else.

use plotters::prelude::*;
use serde::Serialize;
use std::error::Error as StdError;

use crate::country::{Attribute, Country};
use crate::error::{Error, Result};
use crate::graph::{GraphOptions, render_error};

/// Largest marker radius in pixels, given to the most populous country
const MAX_RADIUS: f64 = 20.0;

/// Radius for countries without a population value
const DEFAULT_RADIUS: f64 = 4.0;

/// A plotted country
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub name: String,
    /// `gdp`
    pub x: f64,
    /// `avg_income`
    pub y: f64,
    /// `population`, drives the marker area
    pub size: Option<f64>,
}

/// Countries that have both a GDP and an income value, in storage order
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterPlot {
    pub points: Vec<ScatterPoint>,
}

impl ScatterPlot {
    pub fn from_records(records: &[Country]) -> Result<ScatterPlot> {
        let points: Vec<ScatterPoint> = records
            .iter()
            .filter_map(|c| {
                Some(ScatterPoint {
                    name: c.name().to_string(),
                    x: c.get(Attribute::Gdp).as_f64()?,
                    y: c.get(Attribute::AvgIncome).as_f64()?,
                    size: c.get(Attribute::Population).as_f64(),
                })
            })
            .collect();

        if points.is_empty() {
            return Err(Error::InsufficientData(
                "no country has both gdp and avg_income".to_string(),
            ));
        }
        Ok(ScatterPlot { points })
    }

    /// Marker radius: area proportional to population
    pub fn radius(&self, point: &ScatterPoint) -> f64 {
        let max = self
            .points
            .iter()
            .filter_map(|p| p.size)
            .fold(0.0, f64::max);
        match point.size {
            Some(size) if max > 0.0 && size > 0.0 => (MAX_RADIUS * (size / max).sqrt()).max(2.0),
            _ => DEFAULT_RADIUS,
        }
    }
}

pub fn default_options() -> GraphOptions {
    GraphOptions {
        title: "GDP vs. average income".to_string(),
        x_label: "gdp".to_string(),
        y_label: "avg_income".to_string(),
        width: 900,
        height: 600,
    }
}

/// Pixel position of a marker inside the SVG, shipped to the hover script
#[derive(Serialize)]
struct Mark<'a> {
    #[serde(flatten)]
    point: &'a ScatterPoint,
    px: i32,
    py: i32,
    r: f64,
}

/// Build the embeddable HTML fragment for `records`
pub fn create_scatter_fragment(records: &[Country]) -> Result<String> {
    let plot = ScatterPlot::from_records(records)?;
    log::debug!("rendering scatter with {} points", plot.points.len());
    render_fragment(&plot, &default_options())
}

pub fn render_fragment(plot: &ScatterPlot, options: &GraphOptions) -> Result<String> {
    let mut svg = String::new();
    let pixels = draw_svg(plot, options, &mut svg).map_err(render_error)?;

    let marks: Vec<Mark<'_>> = plot
        .points
        .iter()
        .zip(pixels)
        .map(|(point, (px, py))| Mark {
            point,
            px,
            py,
            r: plot.radius(point),
        })
        .collect();
    // "</" would end the script element early
    let data = serde_json::to_string(&marks)
        .map_err(render_error)?
        .replace("</", "<\\/");

    Ok(format!(
        concat!(
            "<div class=\"scatter-chart\" style=\"position:relative;display:inline-block\">\n",
            "{svg}\n",
            "<script type=\"application/json\" class=\"scatter-data\">{data}</script>\n",
            "<div class=\"scatter-tooltip\" style=\"position:absolute;display:none;pointer-events:none;",
            "background:#fff;border:1px solid #888;padding:2px 6px;font:12px sans-serif\"></div>\n",
            "<script>{script}</script>\n",
            "</div>"
        ),
        svg = svg,
        data = data,
        script = HOVER_SCRIPT,
    ))
}

fn draw_svg(
    plot: &ScatterPlot,
    options: &GraphOptions,
    out: &mut String,
) -> std::result::Result<Vec<(i32, i32)>, Box<dyn StdError>> {
    let root = SVGBackend::with_string(out, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = padded_range(plot.points.iter().map(|p| p.x));
    let y_range = padded_range(plot.points.iter().map(|p| p.y));

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(plot.points.iter().map(|p| {
        Circle::new((p.x, p.y), plot.radius(p), BLUE.mix(0.5).filled())
    }))?;
    chart.draw_series(plot.points.iter().map(|p| {
        Text::new(p.name.clone(), (p.x, p.y), ("sans-serif", 12).into_font())
    }))?;

    let pixels = plot
        .points
        .iter()
        .map(|p| chart.backend_coord(&(p.x, p.y)))
        .collect();

    root.present()?;
    Ok(pixels)
}

// Data range widened by 10% on each side so markers are not clipped
fn padded_range(values: impl Iterator<Item = f64>) -> std::ops::Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let pad = if max > min {
        (max - min) * 0.1
    } else {
        min.abs().max(1.0) * 0.1
    };
    (min - pad)..(max + pad)
}

const HOVER_SCRIPT: &str = r#"(function () {
  var root = document.currentScript.parentElement;
  var svg = root.querySelector("svg");
  var tip = root.querySelector(".scatter-tooltip");
  var marks = JSON.parse(root.querySelector(".scatter-data").textContent);
  if (!svg) { return; }
  svg.addEventListener("mousemove", function (e) {
    var box = svg.getBoundingClientRect();
    var sx = svg.width.baseVal.value / box.width;
    var sy = svg.height.baseVal.value / box.height;
    var mx = (e.clientX - box.left) * sx;
    var my = (e.clientY - box.top) * sy;
    var hit = null;
    marks.forEach(function (m) {
      var d = Math.hypot(m.px - mx, m.py - my);
      if (d <= m.r + 3 && (hit === null || d < hit.d)) { hit = { m: m, d: d }; }
    });
    if (hit === null) { tip.style.display = "none"; return; }
    var m = hit.m;
    tip.textContent = m.name + " | gdp: " + m.x + " | avg_income: " + m.y +
      (m.size === null ? "" : " | population: " + m.size);
    tip.style.left = (e.clientX - box.left + 12) + "px";
    tip.style.top = (e.clientY - box.top + 12) + "px";
    tip.style.display = "block";
  });
  svg.addEventListener("mouseleave", function () { tip.style.display = "none"; });
})();"#;

#[cfg(test)]
mod test {
    use super::*;
    use crate::country::NewCountry;

    fn records() -> Vec<Country> {
        vec![
            Country {
                id: 1,
                fields: NewCountry::named("Latvia")
                    .with(Attribute::Gdp, 40)
                    .with(Attribute::AvgIncome, 1200)
                    .with(Attribute::Population, 1_900_000),
            },
            Country {
                id: 2,
                fields: NewCountry::named("Estonia")
                    .with(Attribute::Gdp, 38)
                    .with(Attribute::AvgIncome, 1300),
            },
            Country {
                id: 3,
                fields: NewCountry::named("Malta").with(Attribute::AvgIncome, 1500),
            },
        ]
    }

    #[test]
    fn points_need_both_axes() {
        let plot = ScatterPlot::from_records(&records()).unwrap();
        let names: Vec<&str> = plot.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Latvia", "Estonia"]);
        assert_eq!(plot.points[0].size, Some(1_900_000.0));
        assert_eq!(plot.points[1].size, None);
    }

    #[test]
    fn largest_population_gets_max_radius() {
        let plot = ScatterPlot::from_records(&records()).unwrap();
        assert_eq!(plot.radius(&plot.points[0]), MAX_RADIUS);
        assert_eq!(plot.radius(&plot.points[1]), DEFAULT_RADIUS);
    }

    // The marker JSON embedded in a rendered fragment
    fn embedded_marks(html: &str) -> serde_json::Value {
        let start = html.find("class=\"scatter-data\">").unwrap() + "class=\"scatter-data\">".len();
        let end = start + html[start..].find("</script>").unwrap();
        serde_json::from_str(&html[start..end]).unwrap()
    }

    #[test]
    fn repeated_rendering_plots_identical_points() {
        let records = records();
        let first = embedded_marks(&create_scatter_fragment(&records).unwrap());
        let second = embedded_marks(&create_scatter_fragment(&records).unwrap());

        let coords = |marks: &serde_json::Value| -> Vec<(f64, f64, i64, i64)> {
            marks
                .as_array()
                .unwrap()
                .iter()
                .map(|m| {
                    (
                        m["x"].as_f64().unwrap(),
                        m["y"].as_f64().unwrap(),
                        m["px"].as_i64().unwrap(),
                        m["py"].as_i64().unwrap(),
                    )
                })
                .collect()
        };
        assert_eq!(coords(&first).len(), 2);
        assert_eq!(coords(&first), coords(&second));
    }

    #[test]
    fn no_plottable_points_is_insufficient() {
        let records = vec![Country {
            id: 1,
            fields: NewCountry::named("Malta"),
        }];
        assert!(matches!(
            create_scatter_fragment(&records),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn degenerate_range_is_widened() {
        let range = padded_range([5.0].into_iter());
        assert!(range.start < 5.0 && range.end > 5.0);
    }

    #[test]
    fn fragment_embeds_svg_and_points() {
        let html = create_scatter_fragment(&records()).unwrap();
        assert!(html.starts_with("<div class=\"scatter-chart\""));
        assert!(html.contains("<svg"));
        assert!(html.contains("\"name\":\"Latvia\""));
        assert!(!html.contains("<script src"));
        assert_eq!(embedded_marks(&html)[0]["name"], "Latvia");
    }
}
