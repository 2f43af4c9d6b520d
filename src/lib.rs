/*!
# EU Country Statistics

A small web application that loads a spreadsheet of European Union country
statistics into a SQLite table, lets a user search the records, and renders
static and interactive charts from the stored data.

## Architecture

### Record Store
- **Technologies**: SQLite via rusqlite
- A single `country` table keyed by an integer id assigned on insert
- Rows are replaced wholesale by a full load or appended by an upload;
  nothing is updated or deleted

### Ingestion
- Workbooks (`.xlsx`, `.xls`, `.ods`) are read with calamine, uploads are
  parsed as CSV
- Headers are mapped onto country columns explicitly; every numeric column
  is declared as an integer and uncoercible cells are kept and reported

### Charts
- Income bar chart, population histogram and correlation heatmap rendered to
  PNG with plotters
- GDP vs. income scatter rendered to an embeddable SVG fragment with hover
  tooltips

### Web Layer (feature `web`)
- **Technologies**: axum, handlebars
- Routes: `/`, `/load_data`, `/countries`, `/charts`, `/interactive-chart`,
  `/upload`

## Modules

- **country**: Country record and stored value types
- **store**: Record store trait and its SQLite implementation
- **tabular**: Workbook and CSV readers
- **ingest**: Full load and incremental upload
- **query**: Name search
- **graph**: Static charts
- **scatter**: Interactive scatter fragment
- **config**: Runtime configuration
- **app**: Routing and templates
*/

pub mod config;
pub mod country;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod query;
pub mod scatter;
pub mod store;
pub mod tabular;

#[cfg(feature = "web")]
pub mod app;

pub use config::Config;
pub use country::{Attribute, Country, NewCountry, Value};
pub use error::{Error, Result};
pub use store::{RecordStore, SqliteStore};
