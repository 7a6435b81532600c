/**
 * This module contains all logic for loading textures from external files and
 * for producing CPU-side geometry (tangent generation, built-in shapes).
 */
pub mod mesh;
pub mod shapes;
pub mod texture;
