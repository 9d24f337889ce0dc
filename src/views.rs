//! Server-rendered pages and fragments.
//!
//! Every interpolated value goes through [`escape`].

use crate::actions::Action;
use crate::dispatch::ActionOutput;
use crate::guard::CSRF_FIELD;
use crate::publish::SummaryLink;
use crate::workspace::SummaryInfo;
use axum::http::StatusCode;
use std::fmt::Write;
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title} - caravel</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n\
         <footer><hr><small>caravel {version}</small></footer>\n</body>\n</html>\n",
        title = escape(title),
        body = body,
        version = VERSION,
    )
}

fn csrf_input(csrf: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
        CSRF_FIELD,
        escape(csrf)
    )
}

pub fn index_page(projects: &[PathBuf], csrf: &str) -> String {
    let mut body = String::new();
    if projects.is_empty() {
        body.push_str("<p>The manifest lists no projects.</p>\n");
    } else {
        body.push_str("<form method=\"post\" action=\"/process\">\n");
        body.push_str(&csrf_input(csrf));
        body.push_str("\n<select name=\"select_project\">\n");
        for project in projects {
            let path = escape(&project.to_string_lossy());
            let _ = writeln!(body, "<option value=\"{path}\">{path}</option>");
        }
        body.push_str("</select>\n<button type=\"submit\">Select</button>\n</form>\n");
    }
    layout("Projects", &body)
}

pub fn process_page(info: &SummaryInfo, csrf: &str) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<table>\n\
         <tr><th>Name</th><td>{}</td></tr>\n\
         <tr><th>Config file</th><td>{}</td></tr>\n\
         <tr><th>Samples</th><td id=\"sample_count\">{}</td></tr>\n\
         <tr><th>Output directory</th><td>{}</td></tr>\n\
         </table>\n",
        escape(&info.name),
        escape(&info.config_file.to_string_lossy()),
        info.sample_count,
        escape(&info.output_dir.to_string_lossy()),
    );

    if !info.subprojects.is_empty() {
        body.push_str("<h2>Subproject</h2>\n<select id=\"subproject\">\n");
        body.push_str("<option value=\"reset\">none</option>\n");
        for sp in &info.subprojects {
            let selected = if info.active_subproject.as_deref() == Some(sp.as_str()) {
                " selected"
            } else {
                ""
            };
            let sp = escape(sp);
            let _ = writeln!(body, "<option value=\"{sp}\"{selected}>{sp}</option>");
        }
        let _ = writeln!(
            body,
            "</select>\n<p id=\"subproj_txt\">{}</p>",
            escape(&info.subproject_text())
        );
    }

    body.push_str("<h2>Action</h2>\n<form method=\"post\" action=\"/action\">\n");
    body.push_str(&csrf_input(csrf));
    body.push_str("\n<select name=\"act\" id=\"act\">\n");
    for action in Action::ALL {
        let _ = writeln!(body, "<option value=\"{0}\">{0}</option>", action.as_str());
    }
    body.push_str(
        "</select>\n<div id=\"options\"></div>\n<button type=\"submit\">Execute</button>\n</form>\n",
    );

    body.push_str("<h2>Summary</h2>\n<button id=\"summary_btn\">Check summary</button>\n");
    body.push_str("<div id=\"summary\"></div>\n");
    body.push_str(PROCESS_SCRIPT);
    layout(&info.name, &body)
}

const PROCESS_SCRIPT: &str = r#"<script>
function load(url, apply) {
  fetch(url, {credentials: "same-origin"}).then(r => r.json()).then(apply);
}
function loadOptions() {
  const act = document.getElementById("act").value;
  load("/_background_options?act=" + encodeURIComponent(act),
       d => { document.getElementById("options").innerHTML = d.options; });
}
document.getElementById("act").addEventListener("change", loadOptions);
loadOptions();
const sp = document.getElementById("subproject");
if (sp) {
  sp.addEventListener("change", () => {
    load("/_background_subproject?sp=" + encodeURIComponent(sp.value), d => {
      document.getElementById("subproj_txt").textContent = d.subproj_txt;
      document.getElementById("sample_count").textContent = d.sample_count;
    });
  });
}
document.getElementById("summary_btn").addEventListener("click", () => {
  load("/_background_summary", d => { document.getElementById("summary").innerHTML = d.summary; });
});
</script>"#;

pub fn options_fragment(options: &[&str]) -> String {
    let mut out = String::from("<fieldset>\n");
    for option in options {
        let option = escape(option);
        let _ = writeln!(
            out,
            "<label><input type=\"checkbox\" name=\"opt\" value=\"{option}\"> {option}</label><br>"
        );
    }
    out.push_str("</fieldset>");
    out
}

pub fn summary_fragment(link: &SummaryLink) -> String {
    match link {
        SummaryLink::Available { href, file_name } => format!(
            "<a href=\"/{}\" target=\"_blank\">{}</a>",
            escape(href),
            escape(file_name)
        ),
        SummaryLink::NotAvailable { file_name } => format!(
            "<p>Summary not available ({} has not been generated)</p>",
            escape(file_name)
        ),
    }
}

pub fn execute_page(output: &ActionOutput) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p>Command: <code>{}</code></p>",
        escape(&output.command.join(" "))
    );
    let status = match (output.exit_code, output.signal) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("terminated by signal {}", signal),
        (None, None) => "unknown exit status".to_string(),
    };
    let _ = writeln!(body, "<p>Finished with {}</p>", escape(&status));
    body.push_str("<pre>");
    for line in &output.lines {
        body.push_str(&escape(line));
        body.push('\n');
    }
    body.push_str("</pre>\n<p><a href=\"/\">Back to projects</a></p>");
    layout("Output", &body)
}

pub fn error_page(status: StatusCode, messages: &[String]) -> String {
    let mut body = String::from("<ul>\n");
    for message in messages {
        let _ = writeln!(body, "<li>{}</li>", escape(message));
    }
    body.push_str("</ul>\n<p><a href=\"/\">Back to projects</a></p>");
    layout(&format!("Error {}", status.as_u16()), &body)
}
