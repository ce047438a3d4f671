mod assembly;
mod elasticity;
mod fixtures;
mod neighbor;
mod traverse;
