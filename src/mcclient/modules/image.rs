use crate::mcclient::ResourceManager;

pub const IMAGES: ResourceManager = ResourceManager::new("image", "images");
