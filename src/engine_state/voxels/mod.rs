//! # Voxel Volume
//!
//! This module describes the procedural volume the terrain is extracted from:
//!
//! * **Chunk**: fixed-size cubic regions identified by their world origin,
//!   and the memoized set of chunks visible around the viewer
//! * **Density**: the signed scalar field and its per-chunk sampling
//! * **Lookup table**: the Marching Cubes triangle table shared by every
//!   mesher backend
//!
//! Nothing here touches the GPU. The compute and meshing modules consume these
//! types to produce triangles.

pub mod chunk;
pub mod density;
pub mod lookup_table;
