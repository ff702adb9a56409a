use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Generate the identity voxel-coordinate grid for a `[D, H, W]` volume.
///
/// Returns a tensor of shape `[1, 3, D, H, W]` where channel `c` holds the
/// index of each voxel along spatial axis `c` (0 = depth, 1 = height,
/// 2 = width). Adding a voxel-unit displacement field to this grid yields
/// absolute source coordinates.
///
/// # Arguments
/// * `shape` - The volume shape `[D, H, W]`
/// * `device` - The device to create the tensor on
pub fn identity_grid<B: Backend>(shape: [usize; 3], device: &B::Device) -> Tensor<B, 5> {
    let [d, h, w] = shape;

    let depth = Tensor::<B, 1, Int>::arange(0..d as i64, device)
        .float()
        .reshape([1, 1, d, 1, 1])
        .repeat(&[1, 1, 1, h, w]);
    let height = Tensor::<B, 1, Int>::arange(0..h as i64, device)
        .float()
        .reshape([1, 1, 1, h, 1])
        .repeat(&[1, 1, d, 1, w]);
    let width = Tensor::<B, 1, Int>::arange(0..w as i64, device)
        .float()
        .reshape([1, 1, 1, 1, w])
        .repeat(&[1, 1, d, h, 1]);

    Tensor::cat(vec![depth, height, width], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_grid_channels() {
        let device = Default::default();
        let grid = identity_grid::<TestBackend>([2, 3, 4], &device);
        assert_eq!(grid.dims(), [1, 3, 2, 3, 4]);

        let data = grid.into_data().to_vec::<f32>().unwrap();
        let voxels = 2 * 3 * 4;
        // Voxel (d=1, h=2, w=3) is the last one in each channel.
        assert_eq!(data[voxels - 1], 1.0);
        assert_eq!(data[2 * voxels - 1], 2.0);
        assert_eq!(data[3 * voxels - 1], 3.0);
        // Voxel (d=0, h=1, w=2) has flat index 1 * 4 + 2.
        assert_eq!(data[6], 0.0);
        assert_eq!(data[voxels + 6], 1.0);
        assert_eq!(data[2 * voxels + 6], 2.0);
    }
}
