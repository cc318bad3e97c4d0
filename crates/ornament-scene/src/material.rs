use {crate::handle::Handle, glam::Vec3};

/// Raw CPU-side texel data. Decoding image files into this form is the
/// caller's business; the renderer only needs the bytes and their layout.
#[derive(Clone, Debug)]
pub struct Texture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub num_components: u32,
    pub bytes_per_component: u32,
    pub bytes_per_row: u32,
    pub is_hdr: bool,
    pub gamma: f32,
}

pub type TextureHandle = Handle<Texture>;

/// Albedo source: either a literal RGB value or a reference to a texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Color {
    Value(Vec3),
    Texture(TextureHandle),
}

impl From<Vec3> for Color {
    fn from(value: Vec3) -> Self { Self::Value(value) }
}

impl From<TextureHandle> for Color {
    fn from(texture: TextureHandle) -> Self { Self::Texture(texture) }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    Lambertian { albedo: Color },
    Metal { albedo: Color, fuzz: f32 },
    Dielectric { ior: f32 },
    DiffuseLight { albedo: Color },
}

impl Material {
    pub fn albedo(&self) -> Option<Color> {
        match self {
            Self::Lambertian { albedo }
            | Self::Metal { albedo, .. }
            | Self::DiffuseLight { albedo } => Some(*albedo),
            Self::Dielectric { .. } => None,
        }
    }
}

pub type MaterialHandle = Handle<Material>;
