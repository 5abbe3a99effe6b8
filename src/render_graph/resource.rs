//! Values that can cross a node boundary

use crate::backend::{BufferHandle, SamplerHandle, TextureHandle};
use bevy_ecs::entity::Entity;
use std::fmt;

/// A resource passed along a slot edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
    Sampler(SamplerHandle),
    Entity(Entity),
}

/// Kind tag of a [`RenderResource`], used to type-check edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderResourceKind {
    Texture,
    Buffer,
    Sampler,
    Entity,
}

impl RenderResource {
    pub fn kind(&self) -> RenderResourceKind {
        match self {
            RenderResource::Texture(_) => RenderResourceKind::Texture,
            RenderResource::Buffer(_) => RenderResourceKind::Buffer,
            RenderResource::Sampler(_) => RenderResourceKind::Sampler,
            RenderResource::Entity(_) => RenderResourceKind::Entity,
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            RenderResource::Texture(texture) => Some(*texture),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        match self {
            RenderResource::Buffer(buffer) => Some(*buffer),
            _ => None,
        }
    }

    pub fn sampler(&self) -> Option<SamplerHandle> {
        match self {
            RenderResource::Sampler(sampler) => Some(*sampler),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<Entity> {
        match self {
            RenderResource::Entity(entity) => Some(*entity),
            _ => None,
        }
    }
}

impl From<TextureHandle> for RenderResource {
    fn from(texture: TextureHandle) -> Self {
        RenderResource::Texture(texture)
    }
}

impl From<BufferHandle> for RenderResource {
    fn from(buffer: BufferHandle) -> Self {
        RenderResource::Buffer(buffer)
    }
}

impl From<SamplerHandle> for RenderResource {
    fn from(sampler: SamplerHandle) -> Self {
        RenderResource::Sampler(sampler)
    }
}

impl From<Entity> for RenderResource {
    fn from(entity: Entity) -> Self {
        RenderResource::Entity(entity)
    }
}

impl fmt::Display for RenderResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderResourceKind::Texture => "texture",
            RenderResourceKind::Buffer => "buffer",
            RenderResourceKind::Sampler => "sampler",
            RenderResourceKind::Entity => "entity",
        };
        f.write_str(name)
    }
}
