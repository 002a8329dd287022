//! Ordered remote directory layouts.
//!
//! Each template is a pure function of base directory, station and date.
//! Adding a layout means adding a row to [`default_templates`].

use chrono::NaiveDate;

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Base directory without trailing `/`; empty for the login root.
    pub base: &'a str,
    pub station: &'a str,
    pub date: NaiveDate,
}

impl TemplateContext<'_> {
    fn yyyy(&self) -> String {
        self.date.format("%Y").to_string()
    }

    fn mm(&self) -> String {
        self.date.format("%m").to_string()
    }

    fn dd(&self) -> String {
        self.date.format("%d").to_string()
    }

    fn ddmmyyyy(&self) -> String {
        self.date.format("%d%m%Y").to_string()
    }

    fn under_base(&self, segments: &[&str]) -> String {
        format!("{}/{}", self.base, segments.join("/"))
    }

    /// `base/prefix/YYYY/MM/DD`
    fn by_day(&self, prefix: &[&str]) -> String {
        let (y, m, d) = (self.yyyy(), self.mm(), self.dd());
        let mut segments = prefix.to_vec();
        segments.extend([y.as_str(), m.as_str(), d.as_str()]);
        self.under_base(&segments)
    }

    /// `base/prefix/YYYY/MM/DDMMYYYY`
    fn by_day_folder(&self, prefix: &[&str]) -> String {
        let (y, m, folder) = (self.yyyy(), self.mm(), self.ddmmyyyy());
        let mut segments = prefix.to_vec();
        segments.extend([y.as_str(), m.as_str(), folder.as_str()]);
        self.under_base(&segments)
    }
}

/// A named directory layout.
#[derive(Clone, Copy)]
pub struct PathTemplate {
    pub name: &'static str,
    render: fn(&TemplateContext<'_>) -> String,
}

impl PathTemplate {
    #[must_use]
    pub const fn new(name: &'static str, render: fn(&TemplateContext<'_>) -> String) -> Self {
        Self { name, render }
    }

    #[must_use]
    pub fn render(&self, ctx: &TemplateContext<'_>) -> String {
        (self.render)(ctx)
    }
}

impl std::fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTemplate").field("name", &self.name).finish()
    }
}

/// Known server layouts in probing order.
#[must_use]
pub fn default_templates() -> Vec<PathTemplate> {
    vec![
        PathTemplate::new("archive-upper", |c| c.by_day(&["ARCHIVE"])),
        PathTemplate::new("archive-title", |c| c.by_day(&["Archive"])),
        PathTemplate::new("archive-lower", |c| c.by_day(&["archive"])),
        PathTemplate::new("received", |c| c.by_day_folder(&["received"])),
        PathTemplate::new("station-received", |c| {
            c.by_day_folder(&[c.station, "received"])
        }),
        PathTemplate::new("archived-lower", |c| c.by_day_folder(&["archived"])),
        PathTemplate::new("archived-title", |c| c.by_day_folder(&["Archived"])),
        PathTemplate::new("base", |c| {
            if c.base.is_empty() {
                "/".to_string()
            } else {
                c.base.to_string()
            }
        }),
        PathTemplate::new("flat-day", |c| c.by_day(&[])),
        PathTemplate::new("flat-day-folder", |c| c.by_day_folder(&[])),
        PathTemplate::new("data-lower", |c| c.by_day(&["data"])),
        PathTemplate::new("data-upper", |c| c.by_day(&["DATA"])),
        PathTemplate::new("station", |c| c.under_base(&[c.station])),
        PathTemplate::new("station-day", |c| c.by_day(&[c.station])),
        PathTemplate::new("station-day-folder", |c| c.by_day_folder(&[c.station])),
    ]
}

/// Whether the template output depends on the station.
///
/// Station-independent layouts are shared by every station on the same
/// server and date.
#[must_use]
pub fn is_station_scoped(template: &PathTemplate) -> bool {
    let date = NaiveDate::MIN;
    let a = template.render(&TemplateContext {
        base: "",
        station: "A",
        date,
    });
    let b = template.render(&TemplateContext {
        base: "",
        station: "B",
        date,
    });
    a != b
}
