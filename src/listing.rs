use crate::response::html_escape;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io;
use std::path::Path;

/// Characters escaped in a single link segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

#[derive(Debug)]
struct Entry {
    name: String,
    is_dir: bool,
    is_symlink: bool,
}

fn read_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        // Follow links so a link to a directory still gets a trailing slash.
        let is_dir = if file_type.is_symlink() {
            entry.path().is_dir()
        } else {
            file_type.is_dir()
        };
        entries.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink: file_type.is_symlink(),
        });
    }
    entries.sort_by_key(|entry| entry.name.to_lowercase());
    Ok(entries)
}

/// Render an HTML index of `dir`, which is reached through `url_path`.
pub fn render(dir: &Path, url_path: &str) -> io::Result<Vec<u8>> {
    let entries = read_entries(dir)?;
    let title = format!(
        "Directory listing for {}",
        html_escape(&percent_decode_str(url_path).decode_utf8_lossy())
    );

    let mut html = format!(
        "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{0}</title>\n</head>\n<body>\n<h1>{0}</h1>\n<hr>\n<ul>\n",
        title
    );
    for entry in entries {
        let mut display = entry.name.clone();
        let mut link = utf8_percent_encode(&entry.name, SEGMENT).to_string();
        if entry.is_dir {
            link.push('/');
        }
        // A link is marked with `@` in place of the directory slash.
        if entry.is_symlink {
            display.push('@');
        } else if entry.is_dir {
            display.push('/');
        }
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            html_escape(&link),
            html_escape(&display)
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");

    Ok(html.into_bytes())
}
