use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::error::ReportError;

/// One section of a report, kept as a typed node and rendered at save time.
#[derive(Debug, Clone, PartialEq)]
enum ReportNode {
    Table {
        title: String,
        rows: Vec<Vec<String>>,
    },
    Plot {
        title: String,
        image_path: String,
    },
    Reference {
        href: String,
        label: String,
    },
    /// Body content recovered from a previously saved report.
    Raw(String),
}

/// An append-only HTML report. Sections and references accumulate in a
/// single ordered list, so the saved document reproduces call order exactly.
///
/// Titles and image paths are embedded verbatim; callers are expected to
/// pass plot paths relative to the directory the report will be saved in.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    title: String,
    generated: String,
    nodes: Vec<ReportNode>,
}

impl ReportDocument {
    pub fn new(title: &str) -> Self {
        ReportDocument {
            title: title.to_string(),
            generated: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            nodes: Vec::new(),
        }
    }

    /// Reconstruct a report from a previously saved document. Missing title
    /// markers degrade to an empty title; the existing body is preserved as
    /// a leading raw node so further sections append after it.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        tracing::debug!("loading report {}", path.display());
        let src = match fs::read_to_string(path) {
            Ok(src) => src,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReportError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::parse(&src))
    }

    fn parse(src: &str) -> Self {
        let title = extract_between(src, "<title>", "</title>")
            .unwrap_or_default()
            .to_string();
        let generated = extract_between(src, "<meta name=\"generated\" content=\"", "\">")
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

        let mut nodes = Vec::new();
        let body = body_content(src);
        if !body.trim().is_empty() {
            nodes.push(ReportNode::Raw(body.to_string()));
        }
        ReportDocument {
            title,
            generated,
            nodes,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Append a titled table, one `<tr>` per row of cells.
    pub fn add_table_section(&mut self, title: &str, rows: Vec<Vec<String>>) {
        self.nodes.push(ReportNode::Table {
            title: title.to_string(),
            rows,
        });
    }

    /// Append a titled table holding a single row of alternating key/value
    /// cells.
    pub fn add_metadata_section(&mut self, title: &str, pairs: &[(String, String)]) {
        let row = pairs
            .iter()
            .flat_map(|(k, v)| [k.clone(), v.clone()])
            .collect();
        self.nodes.push(ReportNode::Table {
            title: title.to_string(),
            rows: vec![row],
        });
    }

    /// Append a titled image section. The path is rendered verbatim.
    pub fn add_plot_section(&mut self, title: &str, image_path: &str) {
        self.nodes.push(ReportNode::Plot {
            title: title.to_string(),
            image_path: image_path.to_string(),
        });
    }

    /// Append a hyperlink to another report.
    pub fn add_reference(&mut self, href: &str, label: &str) {
        self.nodes.push(ReportNode::Reference {
            href: href.to_string(),
            label: label.to_string(),
        });
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
        out.push_str(&format!("<title>{}</title>\n", self.title));
        out.push_str(&format!(
            "<meta name=\"generated\" content=\"{}\">\n",
            self.generated
        ));
        out.push_str("</head>\n<body>\n");
        out.push_str(&format!("<h1>{}</h1>\n", self.title));
        for node in &self.nodes {
            render_node(node, &mut out);
        }
        out.push_str("</body>\n</html>\n");
        out
    }

    /// Serialize to `path`, replacing any existing file. Writes to a
    /// temporary sibling first so an interrupted save never leaves a
    /// truncated report behind.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        tracing::debug!("saving report {}", path.display());
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, self.render())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn render_node(node: &ReportNode, out: &mut String) {
    match node {
        ReportNode::Table { title, rows } => {
            out.push_str("<hr>\n<section>\n");
            out.push_str(&format!("<h2>{}</h2>\n", title));
            out.push_str(
                "<table style=\"border:1px solid black;border-collapse:collapse; width:60%\">\n",
            );
            for row in rows {
                out.push_str("<tr style=\"border:1px solid black\">");
                for cell in row {
                    out.push_str(&format!("<td>{}</td>", cell));
                }
                out.push_str("</tr>\n");
            }
            out.push_str("</table>\n</section>\n");
        }
        ReportNode::Plot { title, image_path } => {
            out.push_str("<hr>\n<section>\n");
            out.push_str(&format!("<h2>{}</h2>\n", title));
            out.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\">\n",
                image_path, title
            ));
            out.push_str("</section>\n");
        }
        ReportNode::Reference { href, label } => {
            out.push_str(&format!("<a href=\"{}\">{}</a><br />\n", href, label));
        }
        ReportNode::Raw(content) => out.push_str(content),
    }
}

fn extract_between<'a>(src: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = src.find(open)? + open.len();
    let end = src[start..].find(close)? + start;
    Some(&src[start..end])
}

/// Body content of a saved report: everything after the `<h1>` heading
/// (falling back to the `<body>` tag) up to the closing body marker.
fn body_content(src: &str) -> &str {
    let start = src
        .find("</h1>")
        .map(|pos| pos + "</h1>".len())
        .or_else(|| src.find("<body>").map(|pos| pos + "<body>".len()))
        .unwrap_or(0);
    let end = src[start..]
        .find("</body>")
        .map(|pos| pos + start)
        .unwrap_or(src.len());
    src[start..end].trim_start_matches('\n')
}
