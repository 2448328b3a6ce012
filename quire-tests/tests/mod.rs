mod append;
mod copy;
mod lifecycle;
