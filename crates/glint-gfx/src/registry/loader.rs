//! Asynchronous pixel sourcing.
//!
//! The registry never blocks on IO. `load_texture` hands the loader a
//! [`LoadTicket`]; the loader resolves it from any thread, and the registry
//! drains completions on the frame thread in `poll_loads`.

use std::sync::mpsc::Sender;

use crate::registry::TextureHandle;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct PixelImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

/// A finished (or failed) load travelling back to the registry.
pub(crate) struct LoadCompletion {
    pub handle: TextureHandle,
    pub result: anyhow::Result<PixelImage>,
}

/// One outstanding load request. Consumed by [`LoadTicket::complete`].
pub struct LoadTicket {
    handle: TextureHandle,
    tx: Sender<LoadCompletion>,
}

impl LoadTicket {
    pub(crate) fn new(handle: TextureHandle, tx: Sender<LoadCompletion>) -> Self {
        Self { handle, tx }
    }

    /// Delivers the result. Safe to call from any thread; if the registry is
    /// gone the completion is simply dropped.
    pub fn complete(self, result: anyhow::Result<PixelImage>) {
        let _ = self.tx.send(LoadCompletion { handle: self.handle, result });
    }
}

/// Source of texture pixels, injected into the renderer.
///
/// Implementations decide what a path means and where decoding happens.
pub trait ResourceLoader {
    fn request(&mut self, path: &str, ticket: LoadTicket);
}

/// Loads and decodes image files from the local filesystem, one worker
/// thread per request.
#[derive(Debug, Default)]
pub struct FileLoader;

impl ResourceLoader for FileLoader {
    fn request(&mut self, path: &str, ticket: LoadTicket) {
        let path = path.to_owned();
        std::thread::spawn(move || {
            ticket.complete(decode_file(&path));
        });
    }
}

fn decode_file(path: &str) -> anyhow::Result<PixelImage> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(PixelImage { width, height, pixels: img.into_raw() })
}

/// Loader that never completes anything. For headless use where all
/// textures are created synchronously.
#[derive(Debug, Default)]
pub struct NullLoader;

impl ResourceLoader for NullLoader {
    fn request(&mut self, path: &str, _ticket: LoadTicket) {
        log::warn!("texture load requested with no loader configured: {path}");
    }
}
