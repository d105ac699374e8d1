//! Fixture trees laid out like ACCESS model output.
//!
//! Every file holds CDL text under a `.nc` name, so discovery sees the same
//! names as on a real archive while `CdlOpener` can read the content.

use std::path::{Path, PathBuf};

use crate::generators::{ice_daily, ocean_grid, ocean_month, CdlFile, DataVariable, TimeAxis};

/// ACCESS-OM2: `<root>/outputNNN/{ocean,ice/OUTPUT}/...`, one output
/// directory per model year starting at 1900, plus restart and coupling
/// files discovery must skip.
pub fn om2_tree(root: &Path, outputs: usize) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for idx in 0..outputs {
        let year = 1900 + idx as i32;
        let output = root.join(format!("output{:03}", idx));
        files.push(ocean_month(year, 12).write(&output, "ocean/ocean_month.nc"));
        let ice = format!("ice/OUTPUT/iceh.{}-01-daily.nc", year);
        files.push(ice_daily(year, 31).write(&output, &ice));
        if idx == 0 {
            files.push(ocean_grid().write(&output, "ocean/ocean_grid.nc"));
        }

        // Excluded by the family defaults.
        let restart = root.join(format!("restart{:03}", idx));
        ocean_grid().write(&restart, "ocean/ocean_temp_salt.res.nc");
        ocean_grid().write(&output, "ice/o2i.nc");
    }
    files.sort();
    files
}

/// ACCESS-ESM1.5: `<root>/<exp>/history/{atm,ocn}/...` for each year.
pub fn esm_tree(root: &Path, exp: &str, years: usize) -> Vec<PathBuf> {
    let history = root.join(exp).join("history");
    let mut files = Vec::new();
    for idx in 0..years {
        let year = 1900 + idx as i32;
        let atmos = CdlFile::new("atm")
            .time(TimeAxis::monthly(year, 1))
            .variable(DataVariable::new("fld_s03i236", "TEMPERATURE AT 1.5M").units("K"));
        files.push(atmos.write(&history, &format!("atm/netCDF/{}.pa-{}01_mon.nc", exp, year)));
        let ocean = format!("ocn/ocean_month.nc-{}1231", year);
        files.push(ocean_month(year, 12).write(&history, &ocean));
    }
    ocean_grid().write(&root.join(exp).join("restart"), "ocn/ocean_temp_salt.res.nc");
    files.sort();
    files
}

/// ACCESS-OM3: model components named in flat filenames under `root`.
pub fn om3_tree(root: &Path) -> Vec<PathBuf> {
    let mut files = vec![
        ocean_month(1900, 1).write(root, "access-om3.mom6.h.native_1900_01.nc"),
        ice_daily(1900, 1).write(root, "access-om3.cice.h.1900-01-01.nc"),
        CdlFile::new("ww3")
            .time(TimeAxis::daily(1900, 1))
            .variable(DataVariable::new("HS", "significant wave height").units("m"))
            .write(root, "access-om3.ww3.hi.1900-01-02.nc"),
    ];
    ocean_grid().write(root, "access-om3.mom6.r.1900-01-01-00000.rpointer.nc");
    files.sort();
    files
}

/// Directory with exactly one file and no catalog-eligible variable.
pub fn unnamed_tree(root: &Path) -> PathBuf {
    crate::generators::unnamed_only().write(root, "unnamed.nc")
}

/// Catalog source metadata as written next to a build configuration.
pub fn metadata_yaml(name: &str, uuid: &str) -> String {
    format!(
        "name: {name}\nexperiment_uuid: {uuid}\ndescription: Test experiment {name}\n\
         long_description: Synthetic output for {name}\nmodel:\n  - ACCESS-OM2\n",
    )
}
