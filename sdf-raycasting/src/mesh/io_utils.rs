use cad_import::structure::PrimitiveType;

use super::Triangle;

/// Converts a stream of raw vertex indices of triangle lists, fans or strips into triangles.
pub struct TriangleIterator<I: Iterator<Item = u32>> {
    primitive: PrimitiveType,
    indices: I,

    /// Strips alternate their winding with every emitted triangle.
    odd: bool,

    /// The two previous indices of fans and strips.
    prev: [u32; 2],
}

impl<I: Iterator<Item = u32>> TriangleIterator<I> {
    /// Creates a new triangle iterator and returns none if the primitive type is neither
    /// Triangles, TriangleFan nor TriangleStrip.
    ///
    /// # Arguments
    /// * `primitive` - The primitive type of the raw indices.
    /// * `indices` - The raw underlying index iterator.
    pub fn new(primitive: PrimitiveType, mut indices: I) -> Option<Self> {
        let prev = match primitive {
            PrimitiveType::Triangles => [0, 0],
            PrimitiveType::TriangleFan | PrimitiveType::TriangleStrip => [
                indices.next().unwrap_or_default(),
                indices.next().unwrap_or_default(),
            ],
            _ => return None,
        };

        Some(Self {
            primitive,
            indices,
            odd: false,
            prev,
        })
    }
}

impl<I: Iterator<Item = u32>> Iterator for TriangleIterator<I> {
    type Item = Triangle;

    fn next(&mut self) -> Option<Self::Item> {
        match self.primitive {
            PrimitiveType::Triangles => {
                let v0 = self.indices.next()?;
                let v1 = self.indices.next()?;
                let v2 = self.indices.next()?;

                Some(Triangle::new(v0, v1, v2))
            }
            PrimitiveType::TriangleFan => {
                let v2 = self.indices.next()?;
                let [v0, v1] = self.prev;
                self.prev[1] = v2;

                Some(Triangle::new(v0, v1, v2))
            }
            PrimitiveType::TriangleStrip => {
                let v2 = self.indices.next()?;
                let [v0, v1] = if self.odd {
                    [self.prev[1], self.prev[0]]
                } else {
                    self.prev
                };

                self.prev = [self.prev[1], v2];
                self.odd = !self.odd;

                Some(Triangle::new(v0, v1, v2))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn collect(primitive: PrimitiveType, indices: Vec<u32>) -> Vec<[u32; 3]> {
        TriangleIterator::new(primitive, indices.into_iter())
            .unwrap()
            .map(|t| [t.x, t.y, t.z])
            .collect()
    }

    #[test]
    fn test_triangle_lists_fans_and_strips() {
        assert_eq!(
            collect(PrimitiveType::Triangles, vec![0, 1, 2, 3, 4, 5, 6]),
            vec![[0, 1, 2], [3, 4, 5]]
        );
        assert_eq!(
            collect(PrimitiveType::TriangleFan, vec![0, 1, 2, 3, 4]),
            vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]
        );
        assert_eq!(
            collect(PrimitiveType::TriangleStrip, vec![0, 1, 2, 3, 4]),
            vec![[0, 1, 2], [2, 1, 3], [2, 3, 4]]
        );
    }
}
