use std::sync::Arc;

use poly_lazy::{initializer, value, Importer, StaticResolver};

fn main() -> Result<(), poly_lazy::Error> {
   let resolver = StaticResolver::new()
      .with(
         "app",
         Arc::new(initializer::from_fn(|module| {
            println!("Loading {}", module.name());
            module.set("version", value(3u32))?;
            Ok(())
         })),
      )
      .with(
         "app.plugins",
         Arc::new(initializer::from_fn(|module| {
            println!("Loading {}", module.name());
            module.set("enabled", value(vec!["fmt", "lint"]))?;
            Ok(())
         })),
      );
   let importer = Importer::new(resolver);

   let plugins = {
      let _scope = importer.lazy()?;
      importer.import("app.plugins")?
   };
   println!("Imported: {plugins:?}");

   let app = importer.import("app")?;
   println!("Parent before use: {app:?}");
   println!("app.version = {}", app.get_as::<u32>("version")?);
   println!("enabled = {:?}", plugins.get_as::<Vec<&str>>("enabled")?);
   println!("Registry: {:?}", importer.registry());
   Ok(())
}
