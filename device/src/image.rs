//! Image manager

use crate::device::Device;
use crate::error::DeviceError;
use kernel::texture::{read_image, Extension, ImageTexture, Interpolation};

/// Images are shared when they have the same file and sampling.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ImageKey {
    filename: String,
    interpolation: Interpolation,
    extension: Extension,
}

#[derive(Debug)]
struct Image {
    key: ImageKey,
    users: usize,
    device_slot: Option<usize>,
}

/// Loads image files once per distinct (file, interpolation, extension) and
/// keeps them bound on a device while they have users.
#[derive(Debug, Default)]
pub struct ImageManager {
    images: Vec<Option<Image>>,

    /// Device slots of removed images waiting to be freed.
    released: Vec<usize>,
}

impl ImageManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user of an image and return its image id.
    ///
    /// * `filename`      - Image file.
    /// * `interpolation` - Reconstruction filter.
    /// * `extension`     - Behaviour outside [0, 1].
    pub fn add_image(&mut self, filename: &str, interpolation: Interpolation, extension: Extension) -> usize {
        let key = ImageKey {
            filename: filename.to_owned(),
            interpolation,
            extension,
        };

        if let Some(id) = self.images.iter().position(|i| matches!(i, Some(i) if i.key == key)) {
            if let Some(image) = self.images[id].as_mut() {
                image.users += 1;
            }
            return id;
        }

        let image = Some(Image {
            key,
            users: 1,
            device_slot: None,
        });
        match self.images.iter().position(Option::is_none) {
            Some(id) => {
                self.images[id] = image;
                id
            }
            None => {
                self.images.push(image);
                self.images.len() - 1
            }
        }
    }

    /// Remove a user of an image. The image is released from the device on
    /// the next `device_update` once it has no users.
    ///
    /// * `id` - Image id returned by `add_image`.
    pub fn remove_image(&mut self, id: usize) {
        let Some(slot) = self.images.get_mut(id) else {
            return;
        };
        let Some(image) = slot.as_mut() else {
            return;
        };
        image.users = image.users.saturating_sub(1);
        if image.users == 0 {
            if let Some(device_slot) = image.device_slot {
                self.released.push(device_slot);
            }
            *slot = None;
        }
    }

    /// Number of distinct images with users.
    pub fn len(&self) -> usize {
        self.images.iter().flatten().count()
    }

    /// Returns true if no image has users.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of users of an image.
    ///
    /// * `id` - Image id.
    pub fn users(&self, id: usize) -> usize {
        self.images.get(id).and_then(Option::as_ref).map_or(0, |i| i.users)
    }

    /// Texture slot of an image on the device, once uploaded.
    ///
    /// * `id` - Image id.
    pub fn device_slot(&self, id: usize) -> Option<usize> {
        self.images.get(id).and_then(Option::as_ref).and_then(|i| i.device_slot)
    }

    /// Free released images and upload new ones. Files that cannot be read
    /// are bound as the missing texture.
    ///
    /// * `device` - Device to bind textures on.
    pub fn device_update(&mut self, device: &dyn Device) -> Result<(), DeviceError> {
        for slot in self.released.drain(..) {
            device.tex_free(slot);
        }

        for image in self.images.iter_mut().flatten() {
            if image.device_slot.is_some() {
                continue;
            }
            let ImageKey {
                filename,
                interpolation,
                extension,
            } = &image.key;
            let texture = match read_image(filename) {
                Ok(pixels) => ImageTexture::new(pixels.width, pixels.height, pixels.pixels, *interpolation, *extension),
                Err(err) => {
                    warn!("Unable to load image '{filename}': {err}");
                    ImageTexture::missing(*interpolation, *extension)
                }
            };
            image.device_slot = Some(device.tex_alloc(filename, texture)?);
        }
        Ok(())
    }
}
