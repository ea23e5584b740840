use std::collections::HashMap;
use std::path::Path;

use crate::{datatypes::Vertex, error::PyroliteError};

/// A multi-block results file: an ordered list of zone blocks. By solver
/// convention block 0 is the fluid zone and block 1 is the solid zone.
#[derive(Debug)]
pub struct MultiBlockMesh {
    pub blocks: Vec<Block>,
}

impl MultiBlockMesh {
    pub fn block(&self, index: usize) -> Result<&Block, PyroliteError> {
        self.blocks.get(index).ok_or_else(|| {
            PyroliteError::Mesh(format!(
                "Results file has no block at index {} ({} blocks total)",
                index,
                self.blocks.len()
            ))
        })
    }
}

/// A zone block holding named sub-blocks. Sub-block lookup goes through a
/// name map built once at construction; the first occurrence of a duplicate
/// name wins.
#[derive(Debug)]
pub struct Block {
    pub name: String,
    sub_blocks: Vec<SubBlock>,
    sub_block_indexes: HashMap<String, usize>,
}

impl Block {
    pub fn new(name: String, sub_blocks: Vec<SubBlock>) -> Block {
        let mut sub_block_indexes = HashMap::new();

        for (i, sub_block) in sub_blocks.iter().enumerate() {
            if !sub_block_indexes.contains_key(&sub_block.name) {
                sub_block_indexes.insert(sub_block.name.clone(), i);
            }
        }

        Block {
            name,
            sub_blocks,
            sub_block_indexes,
        }
    }

    /// Finds a sub-block by name
    ///
    /// # Arguments
    /// * `name` - The name of the sub-block, e.g. "Boundary"
    ///
    /// # Returns
    /// A reference to the matching sub-block
    pub fn sub_block(&self, name: &str) -> Result<&SubBlock, PyroliteError> {
        match self.sub_block_indexes.get(name) {
            Some(i) => Ok(&self.sub_blocks[*i]),
            None => Err(PyroliteError::MissingSubBlock(format!(
                "No sub-block named '{}' in block '{}'",
                name, self.name
            ))),
        }
    }
}

/// A named sub-block with its datasets. The first dataset is the working
/// mesh; later datasets are ignored, matching the solver's file layout.
#[derive(Debug)]
pub struct SubBlock {
    pub name: String,
    pub datasets: Vec<UnstructuredMesh>,
}

impl SubBlock {
    pub fn first_dataset(&self) -> Result<&UnstructuredMesh, PyroliteError> {
        match self.datasets.first() {
            Some(d) => Ok(d),
            None => Err(PyroliteError::Mesh(format!(
                "Sub-block '{}' has no datasets",
                self.name
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Cell {
    Line([usize; 2]),
    Triangle([usize; 3]),
}

impl Cell {
    /// Planar area of the cell. Line cells have zero area.
    pub fn area(&self, points: &[Vertex]) -> f64 {
        match self {
            Cell::Line(_) => 0.0,
            Cell::Triangle([a, b, c]) => {
                let p0 = &points[*a];
                let p1 = &points[*b];
                let p2 = &points[*c];

                let ux = p1.x - p0.x;
                let uy = p1.y - p0.y;
                let uz = p1.z - p0.z;
                let vx = p2.x - p0.x;
                let vy = p2.y - p0.y;
                let vz = p2.z - p0.z;

                let cx = uy * vz - uz * vy;
                let cy = uz * vx - ux * vz;
                let cz = ux * vy - uy * vx;

                0.5 * f64::sqrt(f64::powi(cx, 2) + f64::powi(cy, 2) + f64::powi(cz, 2))
            }
        }
    }
}

/// A flat mesh of vertices and cells with named per-vertex scalar fields.
#[derive(Debug)]
pub struct UnstructuredMesh {
    pub points: Vec<Vertex>,
    pub point_fields: HashMap<String, Vec<f64>>,
    pub cells: Vec<Cell>,
}

impl UnstructuredMesh {
    /// Looks up a per-vertex scalar field by name
    ///
    /// # Arguments
    /// * `name` - The field name, e.g. "Heat_Flux"
    ///
    /// # Returns
    /// The field values, indexed by vertex
    pub fn point_field(&self, name: &str) -> Result<&[f64], PyroliteError> {
        match self.point_fields.get(name) {
            Some(f) => Ok(f.as_slice()),
            None => Err(PyroliteError::MissingField(format!(
                "No per-vertex field named '{}' (available: {:?})",
                name,
                self.point_fields.keys().collect::<Vec<&String>>()
            ))),
        }
    }
}

/// Reads a .vtm multi-block results file and every .vtu dataset it references
///
/// # Arguments
/// * `vtm_file` - The path to the .vtm file
///
/// # Returns
/// A MultiBlockMesh with all referenced datasets loaded
pub fn read_vtm(vtm_file: &Path) -> Result<MultiBlockMesh, PyroliteError> {
    let contents = match std::fs::read_to_string(vtm_file) {
        Ok(c) => c,
        Err(err) => {
            return Err(PyroliteError::Mesh(format!(
                "Unable to open results file {}: {err}",
                vtm_file.display()
            )))
        }
    };

    let doc = match roxmltree::Document::parse(&contents) {
        Ok(d) => d,
        Err(err) => {
            return Err(PyroliteError::Mesh(format!(
                "Bad xml in results file {}: {err}",
                vtm_file.display()
            )))
        }
    };

    let base_dir = vtm_file.parent().unwrap_or(Path::new("."));

    let multiblock = match doc
        .descendants()
        .find(|n| n.tag_name().name() == "vtkMultiBlockDataSet")
    {
        Some(n) => n,
        None => {
            return Err(PyroliteError::Mesh(format!(
                "No vtkMultiBlockDataSet element in {}",
                vtm_file.display()
            )))
        }
    };

    let mut blocks: Vec<Block> = Vec::new();

    for zone in multiblock
        .children()
        .filter(|n| n.tag_name().name() == "Block")
    {
        let zone_name = zone
            .attribute("name")
            .unwrap_or("")
            .to_string();

        let mut sub_blocks: Vec<SubBlock> = Vec::new();

        for child in zone.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "Block" => {
                    let sub_name = match child.attribute("name") {
                        Some(n) => n.to_string(),
                        None => {
                            return Err(PyroliteError::Mesh(format!(
                                "Unnamed sub-block in zone '{}' of {}",
                                zone_name,
                                vtm_file.display()
                            )))
                        }
                    };

                    let mut datasets: Vec<UnstructuredMesh> = Vec::new();
                    for dataset in child
                        .children()
                        .filter(|n| n.tag_name().name() == "DataSet")
                    {
                        let file = match dataset.attribute("file") {
                            Some(f) => f,
                            None => {
                                return Err(PyroliteError::Mesh(format!(
                                    "DataSet without file attribute in sub-block '{}'",
                                    sub_name
                                )))
                            }
                        };
                        datasets.push(read_vtu(&base_dir.join(file))?);
                    }

                    sub_blocks.push(SubBlock {
                        name: sub_name,
                        datasets,
                    });
                }
                "DataSet" => {
                    println!(
                        "warning [vtm]: skipping dataset outside a sub-block in zone '{}'",
                        zone_name
                    );
                }
                _ => continue,
            }
        }

        blocks.push(Block::new(zone_name, sub_blocks));
    }

    Ok(MultiBlockMesh { blocks })
}

/// Reads a .vtu unstructured-grid file with ascii data arrays
///
/// # Arguments
/// * `vtu_file` - The path to the .vtu file
///
/// # Returns
/// The parsed UnstructuredMesh
pub fn read_vtu(vtu_file: &Path) -> Result<UnstructuredMesh, PyroliteError> {
    let contents = match std::fs::read_to_string(vtu_file) {
        Ok(c) => c,
        Err(err) => {
            return Err(PyroliteError::Mesh(format!(
                "Unable to open dataset file {}: {err}",
                vtu_file.display()
            )))
        }
    };

    let doc = match roxmltree::Document::parse(&contents) {
        Ok(d) => d,
        Err(err) => {
            return Err(PyroliteError::Mesh(format!(
                "Bad xml in dataset file {}: {err}",
                vtu_file.display()
            )))
        }
    };

    let piece = match doc.descendants().find(|n| n.tag_name().name() == "Piece") {
        Some(p) => p,
        None => {
            return Err(PyroliteError::Mesh(format!(
                "No Piece element in {}",
                vtu_file.display()
            )))
        }
    };

    let num_points: usize = parse_attribute(&piece, "NumberOfPoints", vtu_file)?;
    let num_cells: usize = parse_attribute(&piece, "NumberOfCells", vtu_file)?;

    // Vertex positions
    let points_node = match piece
        .children()
        .find(|n| n.tag_name().name() == "Points")
        .and_then(|p| p.children().find(|n| n.tag_name().name() == "DataArray"))
    {
        Some(n) => n,
        None => {
            return Err(PyroliteError::Mesh(format!(
                "No Points data array in {}",
                vtu_file.display()
            )))
        }
    };

    let coords = parse_float_array(&points_node, vtu_file)?;
    if coords.len() != 3 * num_points {
        return Err(PyroliteError::Mesh(format!(
            "Expected {} coordinates in {}, found {}",
            3 * num_points,
            vtu_file.display(),
            coords.len()
        )));
    }

    let mut points: Vec<Vertex> = Vec::with_capacity(num_points);
    for triple in coords.chunks(3) {
        points.push(Vertex {
            x: triple[0],
            y: triple[1],
            z: triple[2],
        });
    }

    // Per-vertex scalar fields
    let mut point_fields: HashMap<String, Vec<f64>> = HashMap::new();
    if let Some(point_data) = piece.children().find(|n| n.tag_name().name() == "PointData") {
        for array in point_data
            .children()
            .filter(|n| n.tag_name().name() == "DataArray")
        {
            let name = match array.attribute("Name") {
                Some(n) => n.to_string(),
                None => {
                    println!(
                        "warning [vtm]: skipping unnamed point data array in {}",
                        vtu_file.display()
                    );
                    continue;
                }
            };

            let values = parse_float_array(&array, vtu_file)?;
            if values.len() != num_points {
                return Err(PyroliteError::Mesh(format!(
                    "Field '{}' in {} has {} values for {} points",
                    name,
                    vtu_file.display(),
                    values.len(),
                    num_points
                )));
            }

            point_fields.insert(name, values);
        }
    }

    // Cell connectivity
    let cells_node = match piece.children().find(|n| n.tag_name().name() == "Cells") {
        Some(n) => n,
        None => {
            return Err(PyroliteError::Mesh(format!(
                "No Cells element in {}",
                vtu_file.display()
            )))
        }
    };

    let connectivity = parse_index_array(&cells_node, "connectivity", vtu_file)?;
    let offsets = parse_index_array(&cells_node, "offsets", vtu_file)?;
    let types = parse_index_array(&cells_node, "types", vtu_file)?;

    if offsets.len() != num_cells || types.len() != num_cells {
        return Err(PyroliteError::Mesh(format!(
            "Cell table mismatch in {}: {} offsets, {} types, {} cells declared",
            vtu_file.display(),
            offsets.len(),
            types.len(),
            num_cells
        )));
    }

    let mut cells: Vec<Cell> = Vec::with_capacity(num_cells);
    let mut skipped_cells: usize = 0;
    let mut start: usize = 0;

    for (offset, cell_type) in std::iter::zip(&offsets, &types) {
        if *offset > connectivity.len() || *offset < start {
            return Err(PyroliteError::Mesh(format!(
                "Bad cell offset {} in {}",
                offset,
                vtu_file.display()
            )));
        }

        let ids = &connectivity[start..*offset];
        start = *offset;

        for id in ids {
            if *id >= num_points {
                return Err(PyroliteError::Mesh(format!(
                    "Cell references vertex {} of {} in {}",
                    id,
                    num_points,
                    vtu_file.display()
                )));
            }
        }

        // VTK cell types: 3 = line, 5 = triangle
        match (*cell_type, ids.len()) {
            (3, 2) => cells.push(Cell::Line([ids[0], ids[1]])),
            (5, 3) => cells.push(Cell::Triangle([ids[0], ids[1], ids[2]])),
            _ => skipped_cells += 1,
        }
    }

    if skipped_cells > 0 {
        println!(
            "warning [vtm]: skipped {} unsupported cells in {}",
            skipped_cells,
            vtu_file.display()
        );
    }

    Ok(UnstructuredMesh {
        points,
        point_fields,
        cells,
    })
}

fn parse_attribute(
    node: &roxmltree::Node,
    attribute: &str,
    file: &Path,
) -> Result<usize, PyroliteError> {
    match node.attribute(attribute).map(|a| a.parse()) {
        Some(Ok(v)) => Ok(v),
        _ => Err(PyroliteError::Mesh(format!(
            "Missing or non-integer {} attribute in {}",
            attribute,
            file.display()
        ))),
    }
}

/// Parses the whitespace-separated body of an ascii DataArray into floats.
fn parse_float_array(node: &roxmltree::Node, file: &Path) -> Result<Vec<f64>, PyroliteError> {
    if node.attribute("format") != Some("ascii") {
        return Err(PyroliteError::Mesh(format!(
            "Only ascii data arrays are supported; {} has a non-ascii array",
            file.display()
        )));
    }

    let mut values: Vec<f64> = Vec::new();
    for token in node.text().unwrap_or("").split_whitespace() {
        match token.parse() {
            Ok(v) => values.push(v),
            Err(_) => {
                return Err(PyroliteError::Mesh(format!(
                    "Non-float value '{}' in data array of {}",
                    token,
                    file.display()
                )))
            }
        }
    }

    Ok(values)
}

fn parse_index_array(
    cells_node: &roxmltree::Node,
    name: &str,
    file: &Path,
) -> Result<Vec<usize>, PyroliteError> {
    let array = match cells_node
        .children()
        .find(|n| n.tag_name().name() == "DataArray" && n.attribute("Name") == Some(name))
    {
        Some(a) => a,
        None => {
            return Err(PyroliteError::Mesh(format!(
                "No '{}' cell array in {}",
                name,
                file.display()
            )))
        }
    };

    if array.attribute("format") != Some("ascii") {
        return Err(PyroliteError::Mesh(format!(
            "Only ascii data arrays are supported; {} has a non-ascii array",
            file.display()
        )));
    }

    let mut values: Vec<usize> = Vec::new();
    for token in array.text().unwrap_or("").split_whitespace() {
        match token.parse() {
            Ok(v) => values.push(v),
            Err(_) => {
                return Err(PyroliteError::Mesh(format!(
                    "Non-integer value '{}' in '{}' array of {}",
                    token,
                    name,
                    file.display()
                )))
            }
        }
    }

    Ok(values)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;

    pub const WALL_VTU: &str = r#"<?xml version="1.0"?>
<VTKFile type="UnstructuredGrid" version="1.0" byte_order="LittleEndian">
  <UnstructuredGrid>
    <Piece NumberOfPoints="2" NumberOfCells="1">
      <Points>
        <DataArray type="Float64" NumberOfComponents="3" format="ascii">
          0.0 0.0 0.0
          1.0 0.0 0.0
        </DataArray>
      </Points>
      <PointData>
        <DataArray type="Float64" Name="Heat_Flux" format="ascii">
          10.0 20.0
        </DataArray>
      </PointData>
      <Cells>
        <DataArray type="Int64" Name="connectivity" format="ascii">0 1</DataArray>
        <DataArray type="Int64" Name="offsets" format="ascii">2</DataArray>
        <DataArray type="UInt8" Name="types" format="ascii">3</DataArray>
      </Cells>
    </Piece>
  </UnstructuredGrid>
</VTKFile>
"#;

    pub const SOLID_VTU: &str = r#"<?xml version="1.0"?>
<VTKFile type="UnstructuredGrid" version="1.0" byte_order="LittleEndian">
  <UnstructuredGrid>
    <Piece NumberOfPoints="3" NumberOfCells="1">
      <Points>
        <DataArray type="Float64" NumberOfComponents="3" format="ascii">
          0.0 0.0 0.0
          1.0 0.0 0.0
          0.0 1.0 0.0
        </DataArray>
      </Points>
      <PointData>
        <DataArray type="Float64" Name="Temperature" format="ascii">
          2.0 4.0 6.0
        </DataArray>
      </PointData>
      <Cells>
        <DataArray type="Int64" Name="connectivity" format="ascii">0 1 2</DataArray>
        <DataArray type="Int64" Name="offsets" format="ascii">3</DataArray>
        <DataArray type="UInt8" Name="types" format="ascii">5</DataArray>
      </Cells>
    </Piece>
  </UnstructuredGrid>
</VTKFile>
"#;

    pub const VTM: &str = r#"<?xml version="1.0"?>
<VTKFile type="vtkMultiBlockDataSet" version="1.0">
  <vtkMultiBlockDataSet>
    <Block index="0" name="Zone 0 (Comp. Fluid)">
      <Block index="0" name="Boundary">
        <DataSet index="0" name="wall" file="wall.vtu"/>
      </Block>
    </Block>
    <Block index="1" name="Zone 1 (Solid Heat)">
      <Block index="0" name="Internal">
        <DataSet index="0" name="solid" file="solid.vtu"/>
      </Block>
    </Block>
  </vtkMultiBlockDataSet>
</VTKFile>
"#;

    /// Writes a vtm file and its referenced vtu files into a fresh directory.
    pub fn write_test_tree(dir_name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();

        for (name, contents) in [
            ("flow.vtm", VTM),
            ("wall.vtu", WALL_VTU),
            ("solid.vtu", SOLID_VTU),
        ] {
            let mut file = std::fs::File::create(dir.join(name)).unwrap();
            file.write_all(contents.as_bytes()).unwrap();
        }

        dir
    }
}
