use crate::mcclient::ResourceManager;

pub const SERVERS: ResourceManager = ResourceManager::new("server", "servers");
pub const CONTAINERS: ResourceManager = ResourceManager::new("container", "containers");
pub const NETWORKS: ResourceManager = ResourceManager::new("network", "networks");
pub const CACHED_IMAGES: ResourceManager = ResourceManager::new("cachedimage", "cachedimages");
pub const STORAGE_CACHED_IMAGES: ResourceManager =
    ResourceManager::new("storagecachedimage", "storagecachedimages");
