//! Search-path sync for the JetBrains "Protocol Buffers" plugin.
//!
//! The plugin keeps its import paths in `.idea/protoeditor.xml`:
//!
//! ```xml
//! <project version="4">
//!   <component name="ProtobufLanguageSettings">
//!     <option name="autoConfigEnabled" value="false" />
//!     <option name="descriptorPath" value="google/protobuf/descriptor.proto" />
//!     <option name="importPathEntries">
//!       <list>
//!         <ImportPathEntry>
//!           <option name="location" value="file:///work/proto" />
//!           <!--example.com/app/api-->
//!         </ImportPathEntry>
//!       </list>
//!     </option>
//!   </component>
//! </project>
//! ```
//!
//! Every entry written here carries the owning package as a comment so later runs replace only
//! their own entries. Untagged entries are treated as owned too and are dropped on every sync.
//! Failures here never fail generation; see [`spawn_sync`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::thread;

use anyhow::{anyhow, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info, warn};

use crate::error::PbgenError;
use crate::fs::{absolutize, write_file};

pub const IDEA_DIR: &str = ".idea";
pub const CONFIG_FILE: &str = "protoeditor.xml";

const COMPONENT: &str = "ProtobufLanguageSettings";
const DESCRIPTOR_PATH: &str = "google/protobuf/descriptor.proto";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlElement>,
    comment: Option<String>,
}

impl XmlElement {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    /// First child named `name` whose `name` attribute equals `key`, appended when missing.
    fn named_child(&mut self, tag: &str, key: &str) -> &mut XmlElement {
        let index = match self
            .children
            .iter()
            .position(|child| child.name == tag && child.attr("name") == Some(key))
        {
            Some(index) => index,
            None => {
                self.children.push(XmlElement::new(tag).with_attr("name", key));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn child(&mut self, tag: &str) -> &mut XmlElement {
        let index = match self.children.iter().position(|child| child.name == tag) {
            Some(index) => index,
            None => {
                self.children.push(XmlElement::new(tag));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let mut element = Self::new(node.tag_name().name());
        element.attrs = node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();
        for child in node.children() {
            if child.is_element() {
                element.children.push(Self::from_node(child));
            } else if child.is_comment() {
                if let Some(text) = child.text() {
                    element
                        .comment
                        .get_or_insert_with(String::new)
                        .push_str(text);
                }
            }
        }
        element
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attrs {
            start.push_attribute((name.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.comment.is_none() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            child.write(writer)?;
        }
        if let Some(comment) = &self.comment {
            writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// Comment body tagging an entry with its owning package.
///
/// XML comments cannot contain `--` or end with `-`, so those are split with a space.
fn owner_tag(package: &str) -> String {
    let mut tag = package.to_string();
    while tag.contains("--") {
        tag = tag.replace("--", "- -");
    }
    if tag.ends_with('-') {
        tag.push(' ');
    }
    tag
}

fn location_url(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let slashed = if MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(MAIN_SEPARATOR, "/")
    };
    format!("file://{slashed}")
}

/// An opened (or freshly initialised) `protoeditor.xml`.
#[derive(Debug)]
pub struct ProtoEditorConfig {
    path: PathBuf,
    root: XmlElement,
}

impl ProtoEditorConfig {
    /// Walks up from `start` to the nearest `.idea` directory and opens its config file.
    ///
    /// Returns `Ok(None)` when no ancestor has a `.idea` directory. A missing config file yields
    /// an empty `<project version="4">` document.
    ///
    /// # Errors
    /// Returns an error for unreadable or unparsable config files.
    pub fn locate(start: &Path) -> Result<Option<Self>> {
        let start = absolutize(start)?;
        let Some(idea) = start
            .ancestors()
            .map(|dir| dir.join(IDEA_DIR))
            .find(|candidate| candidate.is_dir())
        else {
            return Ok(None);
        };
        Self::open(&idea.join(CONFIG_FILE)).map(Some)
    }

    /// # Errors
    /// Returns an error for unreadable or unparsable config files.
    pub fn open(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(PbgenError::filesystem("read file", path, err).into()),
        };
        let root = if contents.trim().is_empty() {
            XmlElement::new("project").with_attr("version", "4")
        } else {
            let doc = roxmltree::Document::parse(&contents)
                .with_context(|| format!("parsing {}", path.display()))?;
            XmlElement::from_node(doc.root_element())
        };
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the entries owned by `package` with one entry per search path.
    pub fn configure(&mut self, package: &str, search_paths: &[PathBuf]) {
        let component = self.root.named_child("component", COMPONENT);
        component
            .named_child("option", "autoConfigEnabled")
            .set_attr("value", "false");
        component
            .named_child("option", "descriptorPath")
            .set_attr("value", DESCRIPTOR_PATH);

        let entries = component.named_child("option", "importPathEntries");
        entries.attrs = vec![("name".to_string(), "importPathEntries".to_string())];
        let list = entries.child("list");
        let before = list.children.len();
        let tag = owner_tag(package);
        list.children.retain(|entry| {
            entry
                .comment
                .as_deref()
                .is_some_and(|owner| !owner.is_empty() && owner != tag)
        });
        debug!(%package, pruned = before - list.children.len(), "import path entries pruned");

        for path in search_paths {
            let mut entry = XmlElement::new("ImportPathEntry");
            entry.children.push(
                XmlElement::new("option")
                    .with_attr("name", "location")
                    .with_attr("value", &location_url(path)),
            );
            entry.comment = Some(tag.clone());
            list.children.push(entry);
        }
    }

    /// Serializes the document, indented by two spaces, with an XML declaration.
    ///
    /// # Errors
    /// Returns an error when the XML writer fails.
    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.root.write(&mut writer)?;
        let mut out = String::from_utf8(writer.into_inner()).context("rendering protoeditor.xml")?;
        out.push('\n');
        Ok(out)
    }

    /// # Errors
    /// Returns [`PbgenError::Filesystem`] when the file cannot be written.
    pub fn save(&self) -> Result<()> {
        write_file(&self.path, self.render()?.as_bytes())
    }
}

/// Writes `search_paths` for `package` into the nearest IDE config above `package_dir`.
///
/// Returns whether a config was found and updated.
///
/// # Errors
/// Returns read, parse or write failures; callers are expected to only log them.
pub fn sync_search_paths(package_dir: &Path, package: &str, search_paths: &[PathBuf]) -> Result<bool> {
    let Some(mut config) = ProtoEditorConfig::locate(package_dir)? else {
        debug!(dir = %package_dir.display(), "no .idea directory; skipping IDE sync");
        return Ok(false);
    };
    config.configure(package, search_paths);
    config.save()?;
    info!(path = %config.path().display(), entries = search_paths.len(), "IDE import paths updated");
    Ok(true)
}

/// Background IDE sync. Dropping the handle waits for the thread and logs its outcome.
pub struct IdeSync {
    handle: Option<thread::JoinHandle<Result<bool>>>,
}

impl IdeSync {
    #[must_use]
    pub fn disabled() -> Self {
        Self { handle: None }
    }

    /// Waits for the sync and reports failures as warnings.
    pub fn finish(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let outcome = handle
            .join()
            .map_err(|_| anyhow!("IDE sync thread panicked"))
            .and_then(|result| result);
        if let Err(err) = outcome {
            warn!(error = %format!("{err:#}"), "IDE import path sync failed");
        }
    }
}

impl Drop for IdeSync {
    fn drop(&mut self) {
        self.join();
    }
}

/// Starts [`sync_search_paths`] on its own thread.
#[must_use]
pub fn spawn_sync(package_dir: PathBuf, package: String, search_paths: Vec<PathBuf>) -> IdeSync {
    let spawned = thread::Builder::new()
        .name("pbgen-ide-sync".to_string())
        .spawn(move || sync_search_paths(&package_dir, &package, &search_paths));
    match spawned {
        Ok(handle) => IdeSync {
            handle: Some(handle),
        },
        Err(err) => {
            warn!(%err, "failed to start IDE sync thread");
            IdeSync::disabled()
        }
    }
}
