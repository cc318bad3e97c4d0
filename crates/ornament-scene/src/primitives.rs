use {
    crate::model::MeshData,
    glam::{vec3, Vec3},
    ornament_core::math,
    std::f32::consts::PI,
};

const H_SEGMENTS: u32 = 60;
const V_SEGMENTS: u32 = 30;

/// Unit UV-sphere: one vertex per pole, `V_SEGMENTS - 1` rings of
/// `H_SEGMENTS` vertices, triangle fans at the poles and two triangles per
/// quad in between. Normals equal positions.
pub fn uv_sphere() -> MeshData {
    let ring_count = (V_SEGMENTS - 1) as usize;
    let mut vertices = Vec::with_capacity(ring_count * H_SEGMENTS as usize + 2);
    let mut normals = Vec::with_capacity(vertices.capacity());
    let mut uvs = Vec::with_capacity(vertices.capacity());
    let mut indices = Vec::new();

    let mut push_vertex = |position: Vec3| {
        vertices.push(position);
        normals.push(position.normalize());
        uvs.push(math::sphere_tex_coord(position.normalize()));
    };

    push_vertex(vec3(0.0, 1.0, 0.0));

    for v in 1..V_SEGMENTS {
        let theta = v as f32 / V_SEGMENTS as f32 * PI;
        let sin_theta = theta.sin();

        for h in 0..H_SEGMENTS {
            let phi = h as f32 / H_SEGMENTS as f32 * 2.0 * PI;
            push_vertex(vec3(sin_theta * phi.sin(), theta.cos(), sin_theta * phi.cos()));

            if v == 1 {
                // Fan around the top pole.
                indices.push(0);
                indices.push(h + 1);
                indices.push(if h < H_SEGMENTS - 1 { h + 2 } else { 1 });
            } else {
                // Two triangles of the quad between ring v-1 and ring v.
                let i = h + (v - 1) * H_SEGMENTS + 1;
                let j = i - H_SEGMENTS;
                let k = if h < H_SEGMENTS - 1 { j + 1 } else { j - (H_SEGMENTS - 1) };
                let l = if h < H_SEGMENTS - 1 { i + 1 } else { i - (H_SEGMENTS - 1) };

                indices.push(j);
                indices.push(i);
                indices.push(k);
                indices.push(k);
                indices.push(i);
                indices.push(l);
            }
        }
    }

    push_vertex(vec3(0.0, -1.0, 0.0));

    // Fan around the bottom pole.
    let end = vertices.len() as u32 - 1;
    for h in 0..H_SEGMENTS {
        let i = end - H_SEGMENTS + h;
        indices.push(i);
        indices.push(end);
        indices.push(if h < H_SEGMENTS - 1 { i + 1 } else { end - H_SEGMENTS });
    }

    MeshData {
        vertices,
        normals,
        uvs,
        vertex_indices: indices.clone(),
        normal_indices: indices.clone(),
        uv_indices: indices,
    }
}

/// Unit quad in the XZ-plane with an up-facing normal. UVs are left empty
/// so the scene fills in its constant default.
pub fn unit_quad() -> MeshData {
    let vertices = vec![
        vec3(-0.5, 0.0, -0.5),
        vec3(-0.5, 0.0, 0.5),
        vec3(0.5, 0.0, 0.5),
        vec3(0.5, 0.0, -0.5),
    ];
    let indices = vec![3, 1, 0, 2, 1, 3];

    MeshData {
        vertices,
        normals: vec![Vec3::Y; 4],
        uvs: Vec::new(),
        vertex_indices: indices.clone(),
        normal_indices: indices,
        uv_indices: Vec::new(),
    }
}
