mod container;
mod export;
