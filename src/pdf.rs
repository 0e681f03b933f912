//! PDF access and the two text-layer tiers.
//!
//! The pipeline talks to PDFs through two small traits:
//!
//! | Trait | Contract |
//! |-------|----------|
//! | [`PdfBackend`] | whole-document text, and opening a page-addressable document |
//! | [`PdfDocument`] | page count, page text, image paints, XObject resolution |
//!
//! [`LopdfBackend`] implements them with `pdf-extract` (tier A) and `lopdf`
//! (everything page-addressed). Both libraries are blocking, so every call
//! goes through [`run_blocking`]; a panic inside a library surfaces as
//! [`ExtractError::TaskFailed`] instead of taking down the request.
//!
//! A document is opened once per request with [`open_document`] and shared
//! by the page walk and the OCR tier.

use std::fmt;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::ExtractError;
use crate::pdf_content::{scan, ContentOp};
use crate::pdf_image::{decode_content, ImageSpec, MAX_FORM_CONTENT_BYTES};
use crate::raster::{ImageObject, InlineImageArg};

/// Page-tree depth at which resource inheritance gives up.
const MAX_TREE_DEPTH: usize = 32;

/// Form XObjects nested deeper than this are not entered.
const MAX_FORM_DEPTH: usize = 8;

/// Resource names leading to an image XObject, enclosing forms first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XObjectPath(pub Vec<String>);

impl XObjectPath {
    pub fn new(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl fmt::Display for XObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// An image paint found in a page's operator list. Paints inside form
/// XObjects are flattened into the page's list.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePaint {
    /// `Do` naming an XObject.
    XObject(XObjectPath),
    /// `BI ... ID ... EI` with the image carried in the stream.
    Inline(InlineImageArg),
}

/// Entry point to a PDF library.
pub trait PdfBackend: Send + Sync {
    /// Concatenated text of the whole document in one call.
    fn whole_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;

    /// Parses the document for page-by-page access.
    fn open(&self, bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, ExtractError>;
}

/// A parsed, page-addressable document. Pages are zero-based.
pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Text of one page, fragments joined by single spaces.
    fn page_text(&self, page: usize) -> Result<String, ExtractError>;

    /// Image paints of one page, in operator order.
    fn image_paints(&self, page: usize) -> Result<Vec<ImagePaint>, ExtractError>;

    /// Resolves an XObject path against the page's resources. `None` when
    /// a name is unknown, the target is not an image, or it lacks usable
    /// samples.
    fn resolve_xobject(
        &self,
        page: usize,
        path: &XObjectPath,
    ) -> Result<Option<ImageObject>, ExtractError>;
}

/// Runs a blocking library call off the async runtime.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Tier A: whole-document extraction.
pub async fn extract_pdf_whole(
    backend: Arc<dyn PdfBackend>,
    bytes: Arc<[u8]>,
) -> Result<String, ExtractError> {
    let text = run_blocking(move || backend.whole_text(&bytes)).await?;
    Ok(text.trim().to_string())
}

/// Parses the document for the page-addressed tiers.
pub async fn open_document(
    backend: Arc<dyn PdfBackend>,
    bytes: Arc<[u8]>,
) -> Result<Arc<dyn PdfDocument>, ExtractError> {
    run_blocking(move || backend.open(&bytes)).await
}

/// Tier B: page-walk extraction over the first `page_cap` pages.
///
/// A page that fails is skipped. Non-empty pages are separated by a blank
/// line.
pub async fn extract_pdf_by_page(
    doc: Arc<dyn PdfDocument>,
    page_cap: usize,
) -> Result<String, ExtractError> {
    let pages = doc.page_count().min(page_cap);
    debug!(total = doc.page_count(), pages, "walking PDF text layer");

    let mut parts = Vec::new();
    for page in 0..pages {
        let doc = Arc::clone(&doc);
        match run_blocking(move || doc.page_text(page)).await {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Err(e) => debug!(page = page + 1, error = %e, "skipping page"),
        }
    }
    Ok(parts.join("\n\n").trim().to_string())
}

// ═══════════════════════════════════════════════════════════════════════
// lopdf / pdf-extract backend
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn whole_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    }

    fn open(&self, bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        Ok(Arc::new(LopdfDocument { doc, pages }))
    }
}

struct LopdfDocument {
    doc: Document,
    /// (page number, page object), in page order.
    pages: Vec<(u32, ObjectId)>,
}

impl LopdfDocument {
    fn page(&self, page: usize) -> Result<(u32, ObjectId), ExtractError> {
        self.pages
            .get(page)
            .copied()
            .ok_or_else(|| ExtractError::Pdf(format!("page {} out of range", page + 1)))
    }

    fn deref<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    /// The `XObject` dictionary of a `Resources` entry.
    fn resource_xobjects<'a>(&'a self, resources: &'a Object) -> Option<&'a Dictionary> {
        let resources = self.deref(resources)?.as_dict().ok()?;
        let xobjects = resources.get(b"XObject").ok()?;
        self.deref(xobjects)?.as_dict().ok()
    }

    /// The XObject dictionary in effect for a page, following `Parent`
    /// links when the page inherits its resources.
    fn page_xobjects(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut node = self.doc.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(resources) = node.get(b"Resources") {
                return self.resource_xobjects(resources);
            }
            node = match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => self.doc.get_dictionary(*parent).ok()?,
                _ => return None,
            };
        }
        None
    }

    /// XObjects visible inside a form. A form without its own resources
    /// sees the enclosing ones.
    fn form_xobjects<'a>(
        &'a self,
        form: &'a Stream,
        outer: Option<&'a Dictionary>,
    ) -> Option<&'a Dictionary> {
        match form.dict.get(b"Resources") {
            Ok(resources) => self.resource_xobjects(resources),
            Err(_) => outer,
        }
    }

    fn named_stream<'a>(&'a self, xobjects: &'a Dictionary, name: &str) -> Option<&'a Stream> {
        let obj = xobjects.get(name.as_bytes()).ok()?;
        self.deref(obj)?.as_stream().ok()
    }

    fn collect_paints<'a>(
        &'a self,
        content: &[u8],
        xobjects: Option<&'a Dictionary>,
        enclosing: &[String],
        out: &mut Vec<ImagePaint>,
    ) {
        for op in scan(content) {
            match op {
                ContentOp::Paint(name) => {
                    let name = String::from_utf8_lossy(&name).into_owned();
                    let mut path = enclosing.to_vec();
                    path.push(name);
                    let target = xobjects.and_then(|x| self.named_stream(x, &path[path.len() - 1]));
                    match target {
                        Some(form) if is_form(form) => {
                            if enclosing.len() >= MAX_FORM_DEPTH {
                                debug!(form = %XObjectPath(path), "form nesting too deep");
                                continue;
                            }
                            let Some(body) =
                                decode_content(&form.dict, &form.content, MAX_FORM_CONTENT_BYTES)
                            else {
                                debug!(form = %XObjectPath(path), "unreadable form content");
                                continue;
                            };
                            let inner = self.form_xobjects(form, xobjects);
                            self.collect_paints(&body, inner, &path, out);
                        }
                        _ => out.push(ImagePaint::XObject(XObjectPath(path))),
                    }
                }
                ContentOp::InlineImage(operands) => match inline_image_arg(&operands) {
                    Some(arg) => out.push(ImagePaint::Inline(arg)),
                    None => debug!("unreadable inline image"),
                },
            }
        }
    }

    fn xobject_image(&self, stream: &Stream) -> Option<ImageObject> {
        if name_of(stream.dict.get(b"Subtype").ok()?)? != b"Image" {
            return None;
        }
        ImageSpec::from_dict(&stream.dict, |obj| self.deref(obj))?.decode(&stream.content)
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<String, ExtractError> {
        let (number, _) = self.page(page)?;
        let text = self.doc.extract_text(&[number])?;
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn image_paints(&self, page: usize) -> Result<Vec<ImagePaint>, ExtractError> {
        let (_, page_id) = self.page(page)?;
        let content = self.doc.get_page_content(page_id)?;
        let mut paints = Vec::new();
        self.collect_paints(&content, self.page_xobjects(page_id), &[], &mut paints);
        Ok(paints)
    }

    fn resolve_xobject(
        &self,
        page: usize,
        path: &XObjectPath,
    ) -> Result<Option<ImageObject>, ExtractError> {
        let (_, page_id) = self.page(page)?;
        let Some((name, forms)) = path.0.split_last() else {
            return Ok(None);
        };
        let mut xobjects = self.page_xobjects(page_id);
        for form in forms {
            match xobjects.and_then(|x| self.named_stream(x, form)) {
                Some(stream) if is_form(stream) => {
                    xobjects = self.form_xobjects(stream, xobjects);
                }
                _ => return Ok(None),
            }
        }
        let stream = xobjects.and_then(|x| self.named_stream(x, name));
        Ok(stream.and_then(|s| self.xobject_image(s)))
    }
}

fn is_form(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(name_of)
        .is_some_and(|subtype| subtype == b"Form")
}

fn name_of(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Inspects `BI` operands, accepting the image directly (a stream, or a
/// dictionary followed by its data) or nested as the first element of an
/// array.
pub fn inline_image_arg(operands: &[Object]) -> Option<InlineImageArg> {
    match operands {
        [Object::Stream(stream), ..] => {
            inline_image(&stream.dict, &stream.content).map(InlineImageArg::Direct)
        }
        [Object::Dictionary(dict), Object::String(data, _), ..] => {
            inline_image(dict, data).map(InlineImageArg::Direct)
        }
        [Object::Array(inner), ..] => {
            inline_image_arg(inner).map(|arg| InlineImageArg::Wrapped(Box::new(arg)))
        }
        _ => None,
    }
}

fn inline_image(dict: &Dictionary, data: &[u8]) -> Option<ImageObject> {
    ImageSpec::from_dict(dict, Some)?.decode(data)
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted page for [`FakePdf`].
    #[derive(Default)]
    pub struct FakePage {
        pub text: String,
        pub paints: Vec<ImagePaint>,
        pub xobjects: HashMap<XObjectPath, ImageObject>,
        pub broken: bool,
    }

    impl FakePage {
        pub fn text(text: &str) -> Self {
            Self {
                text: text.to_string(),
                ..Default::default()
            }
        }

        pub fn xobject(name: &str, image: ImageObject) -> Self {
            Self::default().with_xobject(name, image)
        }

        pub fn with_xobject(mut self, name: &str, image: ImageObject) -> Self {
            let path = XObjectPath::new(name);
            self.paints.push(ImagePaint::XObject(path.clone()));
            self.xobjects.insert(path, image);
            self
        }

        pub fn with_inline(mut self, image: ImageObject) -> Self {
            self.paints
                .push(ImagePaint::Inline(InlineImageArg::Direct(image)));
            self
        }

        pub fn broken() -> Self {
            Self {
                broken: true,
                ..Default::default()
            }
        }
    }

    pub struct FakeDoc {
        pages: Vec<FakePage>,
        /// Pages whose operator list was requested, in order.
        pub painted: Mutex<Vec<usize>>,
        /// Pages whose text was requested, in order.
        pub text_reads: Mutex<Vec<usize>>,
    }

    impl PdfDocument for FakeDoc {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_text(&self, page: usize) -> Result<String, ExtractError> {
            self.text_reads.lock().unwrap().push(page);
            let page = &self.pages[page];
            if page.broken {
                return Err(ExtractError::Pdf("broken page".into()));
            }
            Ok(page.text.clone())
        }

        fn image_paints(&self, page: usize) -> Result<Vec<ImagePaint>, ExtractError> {
            self.painted.lock().unwrap().push(page);
            let page = &self.pages[page];
            if page.broken {
                return Err(ExtractError::Pdf("broken page".into()));
            }
            Ok(page.paints.clone())
        }

        fn resolve_xobject(
            &self,
            page: usize,
            path: &XObjectPath,
        ) -> Result<Option<ImageObject>, ExtractError> {
            Ok(self.pages[page].xobjects.get(path).cloned())
        }
    }

    /// Backend double that counts tier calls.
    pub struct FakePdf {
        whole: Result<String, String>,
        openable: bool,
        pub doc: Arc<FakeDoc>,
        pub whole_calls: AtomicUsize,
        pub open_calls: AtomicUsize,
    }

    impl FakePdf {
        pub fn new(whole: &str, pages: Vec<FakePage>) -> Arc<Self> {
            Self::build(Ok(whole.to_string()), true, pages)
        }

        /// A backend whose whole-document call fails.
        pub fn failing_whole(pages: Vec<FakePage>) -> Arc<Self> {
            Self::build(Err("unsupported font".to_string()), true, pages)
        }

        /// A backend whose whole-document text is blank and whose
        /// documents fail to open.
        pub fn unopenable() -> Arc<Self> {
            Self::build(Ok(String::new()), false, Vec::new())
        }

        fn build(whole: Result<String, String>, openable: bool, pages: Vec<FakePage>) -> Arc<Self> {
            Arc::new(Self {
                whole,
                openable,
                doc: Arc::new(FakeDoc {
                    pages,
                    painted: Mutex::new(Vec::new()),
                    text_reads: Mutex::new(Vec::new()),
                }),
                whole_calls: AtomicUsize::new(0),
                open_calls: AtomicUsize::new(0),
            })
        }

        pub fn whole_calls(&self) -> usize {
            self.whole_calls.load(Ordering::SeqCst)
        }

        pub fn open_calls(&self) -> usize {
            self.open_calls.load(Ordering::SeqCst)
        }
    }

    impl PdfBackend for FakePdf {
        fn whole_text(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
            self.whole_calls.fetch_add(1, Ordering::SeqCst);
            self.whole.clone().map_err(ExtractError::Pdf)
        }

        fn open(&self, _bytes: &[u8]) -> Result<Arc<dyn PdfDocument>, ExtractError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            if !self.openable {
                return Err(ExtractError::Pdf("invalid file header".into()));
            }
            let doc: Arc<dyn PdfDocument> = self.doc.clone();
            Ok(doc)
        }
    }

    /// A 1x1 RGB image whose red channel identifies it.
    pub fn pixel(red: u8) -> ImageObject {
        ImageObject {
            width: 1,
            height: 1,
            data: vec![red, 0, 0],
            gray: false,
        }
    }
}
